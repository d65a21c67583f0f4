use chrono::Days;
use practice_core::model::{Difficulty, EventColor, ProblemId, ReviewDraft};
use practice_core::time::{fixed_clock, fixed_now, fixed_today};
use services::{ErrorClass, PracticeError, PracticeServices, ReviewServiceError};
use storage::sqlite::SqliteRepository;

fn shared_url(name: &str) -> String {
    format!("sqlite:file:{name}?mode=memory&cache=shared")
}

async fn connect(name: &str) -> PracticeServices {
    PracticeServices::new_sqlite(&shared_url(name), fixed_clock())
        .await
        .expect("connect sqlite")
}

#[tokio::test]
async fn sqlite_review_flow_end_to_end() {
    let services = connect("memdb_services_flow").await;
    let id = services
        .add_problem("Longest Palindromic Substring", Difficulty::Medium)
        .await
        .unwrap();

    let first = services.toggle_solved(id, true).await.unwrap();
    assert!(first.event_created);
    assert_eq!(services.get_due_today(None).await.unwrap().len(), 1);

    let outcome = services
        .submit_review(id, ReviewDraft::new("remembered").with_time_spent(30))
        .await
        .unwrap();
    assert_eq!(outcome.next_stage, 1);
    assert_eq!(outcome.next_review_date, fixed_today() + Days::new(1));

    services.toggle_solved(id, false).await.unwrap();
    let again = services.toggle_solved(id, true).await.unwrap();
    assert!(!again.event_created);
    assert_eq!(services.current_stage(id).await.unwrap(), 1);

    let summary = services.summary(id).await.unwrap();
    assert_eq!(summary.total_reviews, 1);
    assert!((summary.success_rate - 100.0).abs() < f64::EPSILON);
    assert_eq!(summary.projected_reviews.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_independent_writers_never_share_a_sequence() {
    // Two service stacks over one database: no shared lock table, so only
    // the storage constraint keeps the history consistent.
    let left = connect("memdb_services_writers").await;
    let right = connect("memdb_services_writers").await;
    let id = left.add_problem("Jump Game II", Difficulty::Easy).await.unwrap();
    left.toggle_solved(id, true).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let services = if i % 2 == 0 { left.clone() } else { right.clone() };
        tasks.push(tokio::spawn(async move {
            services
                .submit_review(id, ReviewDraft::new("remembered"))
                .await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(PracticeError::Review(
                ReviewServiceError::ConcurrentModification(_),
            )) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let history = left.history(id).await.unwrap();
    assert_eq!(history.len(), succeeded);
    for (i, entry) in history.iter().enumerate() {
        let position = u32::try_from(i).unwrap() + 1;
        assert_eq!(entry.sequence, position);
        assert_eq!(entry.review_stage, position.min(7));
    }
}

#[tokio::test]
async fn sqlite_unrecognised_difficulty_solves_gray_but_cannot_be_scheduled() {
    let services = connect("memdb_services_legacy").await;
    let raw = SqliteRepository::connect(&shared_url("memdb_services_legacy"))
        .await
        .unwrap();
    let row_id = sqlx::query(
        "INSERT INTO problems (title, difficulty, created_at) VALUES ('Legacy Sort', 'unknown', ?1)",
    )
    .bind(fixed_now())
    .execute(raw.pool())
    .await
    .unwrap()
    .last_insert_rowid();
    let id = ProblemId::new(u64::try_from(row_id).unwrap());

    let listed = services.list_problems().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].difficulty(), None);

    let solved = services.toggle_solved(id, true).await.unwrap();
    assert!(solved.event_created);
    let events = services
        .solved_events(fixed_today(), fixed_today())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].color, EventColor::Gray);
    assert_eq!(events[0].difficulty, None);

    let due = services.get_due_today(None).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].difficulty, None);

    let err = services
        .submit_review(id, ReviewDraft::new("remembered"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PracticeError::Review(ReviewServiceError::Configuration(None))
    ));
    assert_eq!(err.class(), ErrorClass::Server);
    assert!(services.history(id).await.unwrap().is_empty());
}
