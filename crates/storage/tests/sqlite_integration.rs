use mastery_core::model::{AttemptRecord, Domain, Profile, Question, QuestionId, UserId};
use mastery_core::time::fixed_now;
use storage::repository::{
    MasteryRepository, ProfileRepository, ProgressRepository, QuestionRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_question(domain: Domain, correct: &str) -> Question {
    Question::new(
        QuestionId::random(),
        "Which one?",
        ["one".into(), "two".into(), "three".into(), "four".into()],
        correct,
        "because",
        domain,
        "misc",
    )
    .unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_fetch_filters_by_domain_and_limits() {
    let repo = connect("memdb_fetch").await;
    for _ in 0..3 {
        repo.upsert_question(&build_question(Domain::Aptitude, "A"))
            .await
            .unwrap();
        repo.upsert_question(&build_question(Domain::Technical, "B"))
            .await
            .unwrap();
    }

    let all = repo.fetch_questions(None, 10).await.unwrap();
    assert_eq!(all.len(), 6);

    let technical = repo
        .fetch_questions(Some(Domain::Technical), 2)
        .await
        .unwrap();
    assert_eq!(technical.len(), 2);
    assert!(technical.iter().all(|q| q.domain() == Domain::Technical));

    let none = repo.fetch_questions(Some(Domain::Verbal), 10).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn sqlite_upsert_replaces_question_text() {
    let repo = connect("memdb_upsert").await;
    let q = build_question(Domain::Verbal, "C");
    repo.upsert_question(&q).await.unwrap();

    let edited = Question::new(
        q.id(),
        "Edited prompt",
        ["w".into(), "x".into(), "y".into(), "z".into()],
        "D",
        "",
        Domain::Verbal,
        "grammar",
    )
    .unwrap();
    repo.upsert_question(&edited).await.unwrap();

    let fetched = repo.fetch_questions(None, 10).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].prompt(), "Edited prompt");
    assert_eq!(fetched[0].correct_answer(), "D");
}

#[tokio::test]
async fn sqlite_attempts_maintain_mastery_and_points() {
    let repo = connect("memdb_triggers").await;
    let user = UserId::random();
    let q = build_question(Domain::Aptitude, "B");
    repo.upsert_question(&q).await.unwrap();
    repo.upsert_profile(&Profile::new(user, Some("Kiran".into())))
        .await
        .unwrap();

    for correct in [true, false, true] {
        let rec = AttemptRecord::new(user, q.id(), correct, fixed_now());
        repo.append_attempt(&rec).await.unwrap();
    }

    assert_eq!(repo.count_attempts(user).await.unwrap(), 3);

    let mastery = repo.mastery_for_user(user).await.unwrap();
    assert_eq!(mastery.len(), 1);
    assert_eq!(mastery[0].domain(), Domain::Aptitude);
    assert_eq!(mastery[0].total_attempted(), 3);
    assert_eq!(mastery[0].total_correct(), 2);
    assert_eq!(mastery[0].accuracy_rounded(), 67);

    let profile = repo.get_profile(user).await.unwrap();
    assert_eq!(profile.total_points, 22);
    assert_eq!(profile.display_name.as_deref(), Some("Kiran"));
}

#[tokio::test]
async fn sqlite_attempt_creates_missing_profile() {
    let repo = connect("memdb_new_profile").await;
    let user = UserId::random();
    let q = build_question(Domain::Reasoning, "A");
    repo.upsert_question(&q).await.unwrap();

    repo.append_attempt(&AttemptRecord::new(user, q.id(), false, fixed_now()))
        .await
        .unwrap();

    let profile = repo.get_profile(user).await.unwrap();
    assert_eq!(profile.total_points, 2);
    assert_eq!(profile.display_name_or_default(), "Learner");
}

#[tokio::test]
async fn sqlite_attempt_for_unknown_question_is_not_found() {
    let repo = connect("memdb_fk").await;
    let user = UserId::random();
    let rec = AttemptRecord::new(user, QuestionId::random(), true, fixed_now());

    let err = repo.append_attempt(&rec).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert_eq!(repo.count_attempts(user).await.unwrap(), 0);
    assert!(repo.mastery_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_leaderboard_is_sorted_and_limited() {
    let repo = connect("memdb_leaderboard").await;
    for (name, points) in [("low", 5_u64), ("high", 120), ("mid", 40)] {
        let mut profile = Profile::new(UserId::random(), Some(name.into()));
        profile.total_points = points;
        repo.upsert_profile(&profile).await.unwrap();
    }

    let board = repo.leaderboard(2).await.unwrap();
    let names: Vec<_> = board.iter().map(|e| e.display_name_or_default()).collect();
    assert_eq!(names, ["high", "mid"]);
}

#[tokio::test]
async fn sqlite_missing_profile_is_not_found() {
    let repo = connect("memdb_missing_profile").await;
    let err = repo.get_profile(UserId::random()).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}
