use axum::http::StatusCode;
use axum_test::TestServer;
use pegs::api::create_router;
use pegs::models::*;
use pegs::{Catalog, Database};
use serde_json::json;
use uuid::Uuid;

fn setup() -> TestServer {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let app = create_router(Catalog::new(db));
    TestServer::new(app).expect("Failed to create test server")
}

async fn create_requirement(
    server: &TestServer,
    req_type: &str,
    solution: Uuid,
    name: &str,
) -> Requirement {
    let response = server
        .post("/api/v1/requirements")
        .json(&json!({
            "req_type": req_type,
            "solution_id": solution,
            "name": name,
            "created_by": "ana"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Requirement>()
}

async fn create_relation(
    server: &TestServer,
    rel_type: RelType,
    left: &Requirement,
    right: &Requirement,
) -> axum_test::TestResponse {
    server
        .post("/api/v1/relations")
        .json(&CreateRelationInput {
            rel_type,
            left_id: left.id,
            right_id: right.id,
            created_by: "ana".to_string(),
        })
        .await
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();
        let response = server.get("/api/v1/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
    }
}

mod kinds {
    use super::*;

    #[tokio::test]
    async fn lists_every_kind_with_its_prefix() {
        let server = setup();
        let response = server.get("/api/v1/kinds").await;
        response.assert_status_ok();

        let kinds: Vec<serde_json::Value> = response.json();
        assert_eq!(kinds.len(), ReqType::ALL.len());
        let assumption = kinds
            .iter()
            .find(|k| k["req_type"] == "assumption")
            .expect("assumption listed");
        assert_eq!(assumption["prefix"], "E.4.");
        assert_eq!(assumption["is_abstract"], false);
    }
}

mod requirements {
    use super::*;

    #[tokio::test]
    async fn creates_and_fetches_a_requirement() {
        let server = setup();
        let solution = Uuid::new_v4();
        let created = create_requirement(&server, "assumption", solution, "A1").await;
        assert_eq!(created.req_id.to_string(), "E.4.1");

        let response = server
            .get(&format!("/api/v1/requirements/{}", created.id))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Requirement>(), created);

        let response = server.get("/api/v1/requirements/by-req-id/E.4.1").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Requirement>().id, created.id);
    }

    #[tokio::test]
    async fn accepts_kind_fields_inline() {
        let server = setup();
        let response = server
            .post("/api/v1/requirements")
            .json(&json!({
                "req_type": "person",
                "solution_id": Uuid::new_v4(),
                "created_by": "ana",
                "email": "ana@example.org"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let person: Requirement = response.json();
        assert_eq!(person.props.email(), Some("ana@example.org"));
        assert_eq!(person.name, "{Untitled Person}");
    }

    #[tokio::test]
    async fn rejects_invalid_fields() {
        let server = setup();
        let response = server
            .post("/api/v1/requirements")
            .json(&json!({
                "req_type": "constraint",
                "solution_id": Uuid::new_v4(),
                "created_by": "ana",
                "category": "Wishful Thinking"
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn returns_not_found_for_unknown_ids() {
        let server = setup();
        let response = server
            .get(&format!("/api/v1/requirements/{}", Uuid::new_v4()))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = server.get("/api/v1/requirements/by-req-id/E.4.7").await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = server.get("/api/v1/requirements/by-req-id/X.1").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn updates_append_versions() {
        let server = setup();
        let created = create_requirement(&server, "user_story", Uuid::new_v4(), "Story").await;

        let response = server
            .put(&format!("/api/v1/requirements/{}", created.id))
            .json(&json!({
                "req_type": "user_story",
                "modified_by": "bob",
                "expected_version": 1,
                "priority": "SHOULD"
            }))
            .await;
        response.assert_status_ok();
        let updated: Requirement = response.json();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.props.priority(), Some(MoscowPriority::Should));

        let response = server
            .put(&format!("/api/v1/requirements/{}", created.id))
            .json(&json!({
                "req_type": "user_story",
                "modified_by": "carol",
                "expected_version": 1
            }))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = server
            .put(&format!("/api/v1/requirements/{}", created.id))
            .json(&json!({ "req_type": "epic", "modified_by": "carol" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .get(&format!("/api/v1/requirements/{}/history", created.id))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Vec<Requirement>>().len(), 2);
    }

    #[tokio::test]
    async fn reads_a_past_version() {
        let server = setup();
        let created = create_requirement(&server, "outcome", Uuid::new_v4(), "Before").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let between = chrono::Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        server
            .put(&format!("/api/v1/requirements/{}", created.id))
            .json(&json!({ "req_type": "outcome", "modified_by": "ana", "name": "After" }))
            .await
            .assert_status_ok();

        let response = server
            .get(&format!("/api/v1/requirements/{}/as-of", created.id))
            .add_query_param("at", between.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Requirement>().name, "Before");
    }

    #[tokio::test]
    async fn deleted_requirements_are_gone() {
        let server = setup();
        let solution = Uuid::new_v4();
        let created = create_requirement(&server, "task", solution, "T").await;

        let response = server
            .delete(&format!("/api/v1/requirements/{}", created.id))
            .add_query_param("actor", "bob")
            .await;
        response.assert_status_ok();
        assert!(response.json::<Requirement>().deleted);

        server
            .get(&format!("/api/v1/requirements/{}", created.id))
            .await
            .assert_status(StatusCode::GONE);

        let listed: Vec<Requirement> = server
            .get("/api/v1/requirements")
            .add_query_param("solution_id", solution)
            .await
            .json();
        assert!(listed.is_empty());

        let listed: Vec<Requirement> = server
            .get("/api/v1/requirements")
            .add_query_param("solution_id", solution)
            .add_query_param("include_deleted", true)
            .await
            .json();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn lists_by_kind_with_paging() {
        let server = setup();
        let solution = Uuid::new_v4();
        for name in ["A", "B", "C"] {
            create_requirement(&server, "assumption", solution, name).await;
        }
        create_requirement(&server, "effect", solution, "E").await;

        let listed: Vec<Requirement> = server
            .get("/api/v1/requirements")
            .add_query_param("req_type", "assumption")
            .await
            .json();
        assert_eq!(listed.len(), 3);

        let page: Vec<Requirement> = server
            .get("/api/v1/requirements")
            .add_query_param("solution_id", solution)
            .add_query_param("offset", 1)
            .add_query_param("limit", 2)
            .await
            .json();
        assert_eq!(
            page.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["B", "C"]
        );
    }
}

mod relations {
    use super::*;

    #[tokio::test]
    async fn relates_and_lists_relations() {
        let server = setup();
        let solution = Uuid::new_v4();
        let a = create_requirement(&server, "assumption", solution, "A").await;
        let b = create_requirement(&server, "assumption", solution, "B").await;

        let response = create_relation(&server, RelType::Duplicates, &a, &b).await;
        response.assert_status(StatusCode::CREATED);
        let relation: RequirementRelation = response.json();
        assert_eq!(relation.symbol(), "≡");

        let listed: Vec<RequirementRelation> = server
            .get(&format!("/api/v1/requirements/{}/relations", b.id))
            .add_query_param("direction", "right")
            .await
            .json();
        assert_eq!(listed, vec![relation.clone()]);

        let listed: Vec<RequirementRelation> = server
            .get(&format!("/api/v1/requirements/{}/relations", b.id))
            .add_query_param("direction", "left")
            .await
            .json();
        assert!(listed.is_empty());

        let response = server
            .delete(&format!("/api/v1/relations/{}", relation.id))
            .add_query_param("actor", "bob")
            .await;
        response.assert_status_ok();

        server
            .get(&format!("/api/v1/relations/{}", relation.id))
            .await
            .assert_status(StatusCode::GONE);

        let history: Vec<RequirementRelation> = server
            .get(&format!("/api/v1/relations/{}/history", relation.id))
            .await
            .json();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn rule_violations_are_unprocessable() {
        let server = setup();
        let solution = Uuid::new_v4();
        let a = create_requirement(&server, "assumption", solution, "A").await;
        let e = create_requirement(&server, "effect", solution, "E").await;

        create_relation(&server, RelType::Duplicates, &a, &e)
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        create_relation(&server, RelType::Explains, &a, &e)
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn reports_consistency_issues() {
        let server = setup();
        let solution = Uuid::new_v4();
        let a = create_requirement(&server, "hint", solution, "A").await;
        let b = create_requirement(&server, "hint", solution, "B").await;

        create_relation(&server, RelType::Contradicts, &a, &b)
            .await
            .assert_status(StatusCode::CREATED);
        create_relation(&server, RelType::Duplicates, &b, &a)
            .await
            .assert_status(StatusCode::CREATED);

        let issues: Vec<serde_json::Value> = server
            .get(&format!("/api/v1/solutions/{}/consistency", solution))
            .await
            .json();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["issue"], "contradicts_and_duplicates");
    }
}
