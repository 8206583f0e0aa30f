use rusqlite::Connection;
use storyline_core::db::open_db_in_memory;
use storyline_core::repo::story_repo::{SqliteStoryRepository, StoryRepository};
use storyline_core::repo::submission_repo::{SqliteSubmissionRepository, SubmissionRepository};
use storyline_core::repo::token_repo::{AppendRequest, SqliteTokenRepository, TokenRepository};
use storyline_core::{AppendOnly, RepoError, ShiftInsert, StoryId};

fn fragments(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

fn default_story(conn: &Connection) -> StoryId {
    SqliteStoryRepository::try_new(conn)
        .unwrap()
        .find_or_create_story("default")
        .unwrap()
        .id
}

fn append(repo: &SqliteTokenRepository<'_>, story_id: StoryId, text: &str) -> (i64, i64) {
    let values = fragments(text);
    let outcome = repo
        .append_submission(
            &AppendRequest {
                story_id,
                user_id: 1,
                text,
                fragments: &values,
            },
            &AppendOnly,
        )
        .unwrap();
    (outcome.from, outcome.to)
}

fn values(repo: &SqliteTokenRepository<'_>, story_id: StoryId) -> Vec<String> {
    repo.list_all(story_id)
        .unwrap()
        .into_iter()
        .map(|token| token.value)
        .collect()
}

#[test]
fn find_or_create_story_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStoryRepository::try_new(&conn).unwrap();

    let first = repo.find_or_create_story("default").unwrap();
    let second = repo.find_or_create_story("default").unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(repo.get_story(first.id).unwrap().unwrap().slug, "default");
    assert!(repo.get_story(first.id + 100).unwrap().is_none());
}

#[test]
fn append_only_assigns_consecutive_positions_after_max() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();

    assert_eq!(append(&repo, story_id, "once upon"), (1, 2));
    assert_eq!(append(&repo, story_id, "a time"), (3, 4));
    assert_eq!(repo.max_position(story_id).unwrap(), Some(4));
    assert_eq!(values(&repo, story_id), ["once", "upon", "a", "time"]);
}

#[test]
fn append_records_submission_provenance() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();

    let values = fragments("hello world");
    let outcome = repo
        .append_submission(
            &AppendRequest {
                story_id,
                user_id: 7,
                text: "  hello   world ",
                fragments: &values,
            },
            &AppendOnly,
        )
        .unwrap();

    let submissions = SqliteSubmissionRepository::try_new(&conn).unwrap();
    let submission = submissions
        .get_submission(outcome.submission_id)
        .unwrap()
        .unwrap();
    assert_eq!(submission.user_id, 7);
    assert_eq!(submission.text, "  hello   world ");

    let tokens = repo.tokens_for_submission(outcome.submission_id).unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(tokens.iter().all(|token| token.user_id == 7));
}

#[test]
fn list_submissions_is_newest_first_and_limited() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    append(&repo, story_id, "one");
    append(&repo, story_id, "two");
    append(&repo, story_id, "three");

    let submissions = SqliteSubmissionRepository::try_new(&conn).unwrap();
    let latest = submissions.list_submissions(story_id, Some(2)).unwrap();
    let texts: Vec<_> = latest.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, ["three", "two"]);
}

#[test]
fn append_to_missing_story_fails_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    let values = fragments("lost words");

    let err = repo
        .append_submission(
            &AppendRequest {
                story_id: 42,
                user_id: 1,
                text: "lost words",
                fragments: &values,
            },
            &AppendOnly,
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::StoryNotFound(42)));
    assert_eq!(repo.count_tokens(42).unwrap(), 0);
}

#[test]
fn invalid_fragment_rolls_back_whole_submission() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    let values = vec!["fine".to_string(), "x".repeat(49)];

    let err = repo
        .append_submission(
            &AppendRequest {
                story_id,
                user_id: 1,
                text: "fine xxx",
                fragments: &values,
            },
            &AppendOnly,
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert_eq!(repo.count_tokens(story_id).unwrap(), 0);
}

#[test]
fn window_of_empty_story_starts_at_one() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();

    let window = repo.window(story_id, 10).unwrap();
    assert!(window.tokens.is_empty());
    assert_eq!(window.window_start_position, 1);
}

#[test]
fn window_returns_most_recent_positions_in_order() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    append(&repo, story_id, "a b c d e f");

    let window = repo.window(story_id, 4).unwrap();
    assert_eq!(window.window_start_position, 3);
    let positions: Vec<_> = window.tokens.iter().map(|t| t.position).collect();
    assert_eq!(positions, [3, 4, 5, 6]);
    assert_eq!(repo.count_tokens(story_id).unwrap(), 6);
}

#[test]
fn shift_insert_pushes_later_tokens_back() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    append(&repo, story_id, "once time");

    let frags = fragments("upon a");
    let outcome = repo
        .append_submission(
            &AppendRequest {
                story_id,
                user_id: 2,
                text: "upon a",
                fragments: &frags,
            },
            &ShiftInsert::at(2),
        )
        .unwrap();

    assert_eq!((outcome.from, outcome.to), (2, 3));
    assert_eq!(outcome.new_max_position, 4);
    assert_eq!(values(&repo, story_id), ["once", "upon", "a", "time"]);
    let positions: Vec<_> = repo
        .list_all(story_id)
        .unwrap()
        .iter()
        .map(|t| t.position)
        .collect();
    assert_eq!(positions, [1, 2, 3, 4]);
}

#[test]
fn shift_insert_past_the_end_is_clamped() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    append(&repo, story_id, "a b");

    let values = fragments("c");
    let outcome = repo
        .append_submission(
            &AppendRequest {
                story_id,
                user_id: 1,
                text: "c",
                fragments: &values,
            },
            &ShiftInsert::at(50),
        )
        .unwrap();
    assert_eq!(outcome.from, 3);
}

#[test]
fn delete_at_closes_the_gap() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    append(&repo, story_id, "a rude b c");

    let outcome = repo.delete_at(story_id, 2).unwrap();
    assert!(outcome.deleted);
    assert_eq!(outcome.max_position, Some(3));
    assert_eq!(values(&repo, story_id), ["a", "b", "c"]);

    let positions: Vec<_> = repo
        .list_all(story_id)
        .unwrap()
        .iter()
        .map(|t| t.position)
        .collect();
    assert_eq!(positions, [1, 2, 3]);
}

#[test]
fn delete_at_missing_position_is_noop() {
    let conn = open_db_in_memory().unwrap();
    let story_id = default_story(&conn);
    let repo = SqliteTokenRepository::try_new(&conn).unwrap();
    append(&repo, story_id, "a b");

    let outcome = repo.delete_at(story_id, 9).unwrap();
    assert!(!outcome.deleted);
    assert_eq!(outcome.max_position, Some(2));
    assert!(matches!(
        repo.delete_at(story_id, 0),
        Err(RepoError::Validation(_))
    ));
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let result = SqliteTokenRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::UninitializedConnection { .. })
    ));
}
