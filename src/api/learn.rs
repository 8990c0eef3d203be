//! Learner routes: catalog with progress, outline, chapter view, completion and the quiz.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use utoipa::{IntoParams, ToSchema};

use super::{AppState, CurrentUser};
use crate::{
    access::{self, ParentOutline, UnitAccess},
    content::{
        ParentKind, Progress, Unit,
        parent::{self, CatalogEntry, CatalogFilter},
        quiz::{AnswerFeedback, Quiz, QuizSession, mark_as_read_allowed},
    },
    error::{Error, Result},
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSearch {
    /// Substring of the title
    pub title: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    /// Completed share of published chapters, 0-100
    pub progress: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    #[serde(flatten)]
    pub access: UnitAccess,
    pub quiz_session: QuizSession,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub is_completed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnswerRequest {
    /// Index of the chosen option, 0-3
    pub choice: usize,
}

/// Hide the paid material of a locked chapter.
fn redact(mut unit: Unit) -> Unit {
    unit.body.clear();
    unit.video_url = None;
    unit.quiz = Quiz::default();
    unit
}

/// Resolve a chapter the learner may actually open.
async fn open_unit(
    state: &AppState,
    user_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
) -> Result<Unit> {
    let access = access::resolve_unit_access(&state.database, user_id, kind, parent_id, unit_id).await;
    match access.unit {
        None => Err(Error::NotFound("chapter")),
        Some(_) if access.is_locked => Err(Error::Unauthorized),
        Some(unit) => Ok(unit),
    }
}

async fn quiz_session(session: &Session, unit_id: i64) -> Result<QuizSession> {
    let stored = session
        .get::<QuizSession>(&QuizSession::key(unit_id))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(stored.unwrap_or_default())
}

async fn store_quiz_session(session: &Session, unit_id: i64, quiz: &QuizSession) -> Result<()> {
    session
        .insert(&QuizSession::key(unit_id), quiz)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(())
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}",
    method(get),
    params(("kind" = String, Path, description = "courses or books"), CatalogSearch),
    responses(
        (status = 200, description = "Published entries with the caller's progress where purchased", body = Vec<CatalogEntry>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn my_catalog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(kind): Path<ParentKind>,
    Query(search): Query<CatalogSearch>,
) -> Result<Json<Vec<CatalogEntry>>> {
    let filter = CatalogFilter {
        title: search.title.as_deref(),
        category_id: search.category_id,
    };
    let entries = parent::list_published(&state.database, kind, filter, Some(user_id)).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}",
    method(get),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Published chapters with lock and completion flags", body = ParentOutline),
        (status = 404, description = "Not published and not owned")
    )
)]
pub async fn outline(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
) -> Result<Json<ParentOutline>> {
    let outline = access::parent_outline(&state.database, user_id, kind, parent_id).await;
    if outline.parent.is_none() {
        return Err(Error::NotFound(kind.as_str()));
    }
    Ok(Json(outline))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/progress",
    method(get),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Completion percentage, 0 on any failure", body = ProgressView)
    )
)]
pub async fn parent_progress(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((_kind, parent_id)): Path<(ParentKind, i64)>,
) -> Json<ProgressView> {
    let progress = access::compute_progress_percentage(&state.database, user_id, parent_id).await;
    Json(ProgressView { progress })
}

/// Opening a chapter starts its quiz from scratch.
#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}",
    method(get),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Chapter with lock state, progress and next chapter", body = UnitView),
        (status = 404, description = "Unpublished, missing or in another parent")
    )
)]
pub async fn view_unit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    session: Session,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
) -> Result<Json<UnitView>> {
    let mut access =
        access::resolve_unit_access(&state.database, user_id, kind, parent_id, unit_id).await;
    if !access.is_found() {
        return Err(Error::NotFound("chapter"));
    }
    if access.is_locked {
        access.unit = access.unit.map(redact);
    }
    // the next chapter is a navigation link; its content stays behind its own lock
    if access.purchase.is_none() {
        access.next_unit = access
            .next_unit
            .map(|next| if next.is_free_preview { next } else { redact(next) });
    }
    let quiz_session = QuizSession::default();
    store_quiz_session(&session, unit_id, &quiz_session).await?;
    Ok(Json(UnitView {
        access,
        quiz_session,
    }))
}

/// Mark a chapter read or unread. Marking read a chapter with a quiz needs the
/// quiz finished in this session.
#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}/progress",
    method(put),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    request_body = ProgressRequest,
    responses(
        (status = 200, description = "The stored progress record", body = Progress),
        (status = 400, description = "Quiz not completed"),
        (status = 401, description = "Unauthorized or chapter locked"),
        (status = 404, description = "Chapter not found")
    )
)]
pub async fn set_unit_progress(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    session: Session,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<Progress>> {
    let unit = open_unit(&state, user_id, kind, parent_id, unit_id).await?;
    let quiz = quiz_session(&session, unit_id).await?;
    if !mark_as_read_allowed(&unit.quiz, Some(&quiz), req.is_completed) {
        return Err(Error::Validation(
            "complete the quiz before marking this chapter as read".to_string(),
        ));
    }
    let progress = access::set_progress(&state.database, user_id, unit_id, req.is_completed).await?;
    Ok(Json(progress))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}/quiz/answer",
    method(post),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Whether the answer was right, and the quiz state", body = AnswerFeedback),
        (status = 400, description = "No quiz, finished quiz or choice out of range"),
        (status = 401, description = "Unauthorized or chapter locked"),
        (status = 404, description = "Chapter not found")
    )
)]
pub async fn answer_quiz(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    session: Session,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerFeedback>> {
    let unit = open_unit(&state, user_id, kind, parent_id, unit_id).await?;
    let mut quiz = quiz_session(&session, unit_id).await?;
    let result = quiz.answer(&unit.quiz, req.choice);
    // the session may have been reset by a changed quiz even when answering failed
    store_quiz_session(&session, unit_id, &quiz).await?;
    Ok(Json(result?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}/quiz/reset",
    method(post),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Quiz back at the start", body = QuizSession),
        (status = 401, description = "Unauthorized or chapter locked"),
        (status = 404, description = "Chapter not found")
    )
)]
pub async fn reset_quiz(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    session: Session,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
) -> Result<Json<QuizSession>> {
    open_unit(&state, user_id, kind, parent_id, unit_id).await?;
    let mut quiz = quiz_session(&session, unit_id).await?;
    quiz.reset();
    store_quiz_session(&session, unit_id, &quiz).await?;
    Ok(Json(quiz))
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode};
    use serde_json::{Value, json};
    use sqlx::SqlitePool;

    use crate::{
        access::record_purchase,
        api::testing::{call, sign_in, test_app},
        content::ParentKind,
    };

    /// A published book with a free chapter carrying a two question quiz and a paid chapter.
    async fn published_book(app: &Router, cookie: &str) -> (i64, i64, i64) {
        let cookie = Some(cookie);
        let (_, book, _) =
            call(app, "POST", "/api/books", cookie, Some(json!({ "title": "Rust" }))).await;
        let id = book["id"].as_i64().unwrap();
        let mut chapters = vec![];
        for (title, free) in [("Ownership", true), ("Lifetimes", false)] {
            let (_, chapter, _) = call(
                app,
                "POST",
                &format!("/api/books/{id}/chapters"),
                cookie,
                Some(json!({ "title": title })),
            )
            .await;
            let chapter_id = chapter["id"].as_i64().unwrap();
            let uri = format!("/api/books/{id}/chapters/{chapter_id}");
            let (status, _, _) = call(
                app,
                "PATCH",
                &uri,
                cookie,
                Some(json!({ "body": format!("<p>{title}</p>"), "isFreePreview": free })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            call(app, "PATCH", &format!("{uri}/publish"), cookie, None).await;
            chapters.push(chapter_id);
        }
        let quiz = json!([
            { "question": "Who owns a moved value?", "options": ["caller", "callee", "nobody", "both"], "correctAnswer": 1 },
            { "question": "Can a value have two owners?", "options": ["yes", "no", "sometimes", "only in unsafe"], "correctAnswer": 1 }
        ]);
        let (status, _, _) = call(
            app,
            "PATCH",
            &format!("/api/books/{id}/chapters/{}", chapters[0]),
            cookie,
            Some(json!({ "quiz": quiz })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        call(
            app,
            "PATCH",
            &format!("/api/books/{id}"),
            cookie,
            Some(json!({ "description": "d", "imageUrl": "https://img.example/r.png", "price": 9.5 })),
        )
        .await;
        let (status, _, _) = call(app, "PATCH", &format!("/api/books/{id}/publish"), cookie, None).await;
        assert_eq!(status, StatusCode::OK);
        (id, chapters[0], chapters[1])
    }

    async fn mark(app: &Router, cookie: &str, uri: &str, done: bool) -> (StatusCode, Value) {
        let (status, body, _) = call(
            app,
            "PUT",
            &format!("{uri}/progress"),
            Some(cookie),
            Some(json!({ "isCompleted": done })),
        )
        .await;
        (status, body)
    }

    #[tokio::test]
    async fn quiz_gates_mark_as_read() {
        let (app, _db) = test_app().await;
        let (_, author) = sign_in(&app, "author").await;
        let (book, free, _) = published_book(&app, &author).await;
        let (_, learner) = sign_in(&app, "learner").await;
        let uri = format!("/api/books/{book}/chapters/{free}");

        let (status, view, _) = call(&app, "GET", &uri, Some(&learner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["isLocked"], false);
        assert_eq!(view["quizSession"]["state"], "notStarted");
        assert_eq!(view["unit"]["quiz"].as_array().unwrap().len(), 2);
        // the paid chapter after a free one is only a link
        assert_eq!(view["nextUnit"]["title"], "Lifetimes");
        assert_eq!(view["nextUnit"]["body"], "");

        let (status, _) = mark(&app, &learner, &uri, true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        // un-marking is never gated
        let (status, progress) = mark(&app, &learner, &uri, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["isCompleted"], false);

        let answer = |choice: usize| {
            let app = app.clone();
            let learner = learner.clone();
            let uri = format!("{uri}/quiz/answer");
            async move { call(&app, "POST", &uri, Some(&learner), Some(json!({ "choice": choice }))).await }
        };
        let (status, feedback, _) = answer(1).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(feedback["isCorrect"], true);
        assert_eq!(feedback["session"]["state"], "inProgress");
        let (_, feedback, _) = answer(0).await;
        assert_eq!(feedback["isCorrect"], false);
        assert_eq!(feedback["session"]["state"], "completed");
        assert_eq!(feedback["score"], 1);

        let (status, progress) = mark(&app, &learner, &uri, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["isCompleted"], true);

        // try again puts the gate back
        let (status, reset, _) =
            call(&app, "POST", &format!("{uri}/quiz/reset"), Some(&learner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reset["state"], "notStarted");
        let (status, _) = mark(&app, &learner, &uri, true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn paid_chapter_unlocks_after_purchase() {
        let (app, db): (Router, SqlitePool) = test_app().await;
        let (_, author) = sign_in(&app, "author").await;
        let (book, free, paid) = published_book(&app, &author).await;
        let (learner_id, learner) = sign_in(&app, "learner").await;
        let uri = format!("/api/books/{book}/chapters/{paid}");

        let (status, view, _) = call(&app, "GET", &uri, Some(&learner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["isLocked"], true);
        assert_eq!(view["unit"]["body"], "");
        assert!(view["unit"]["videoUrl"].is_null());
        assert_eq!(view["unit"]["quiz"], json!([]));
        assert!(view["nextUnit"].is_null());
        assert!(view["purchase"].is_null());
        let (status, _) = mark(&app, &learner, &uri, true).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, outline, _) = call(&app, "GET", &format!("/api/books/{book}"), Some(&learner), None).await;
        assert_eq!(outline["units"].as_array().unwrap().len(), 2);
        assert_eq!(outline["units"][1]["isLocked"], true);
        assert_eq!(outline["isPurchased"], false);

        record_purchase(&db, learner_id, ParentKind::Book, book).await.unwrap();
        let (_, view, _) = call(&app, "GET", &uri, Some(&learner), None).await;
        assert_eq!(view["isLocked"], false);
        assert_eq!(view["unit"]["body"], "<p>Lifetimes</p>");
        assert!(view["nextUnit"].is_null());
        let (_, first, _) = call(
            &app,
            "GET",
            &format!("/api/books/{book}/chapters/{free}"),
            Some(&learner),
            None,
        )
        .await;
        assert_eq!(first["nextUnit"]["id"], paid);
        assert_eq!(first["nextUnit"]["body"], "<p>Lifetimes</p>");

        let (status, _) = mark(&app, &learner, &uri, true).await;
        assert_eq!(status, StatusCode::OK);
        let (_, progress, _) =
            call(&app, "GET", &format!("/api/books/{book}/progress"), Some(&learner), None).await;
        assert_eq!(progress["progress"], 50.0);
        let (_, catalog, _) = call(&app, "GET", "/api/books", Some(&learner), None).await;
        assert_eq!(catalog[0]["progress"], 50.0);
        let (_, public, _) = call(&app, "GET", "/api/public/catalog?kind=book", None, None).await;
        assert!(public[0]["progress"].is_null());
    }

    #[tokio::test]
    async fn missing_chapter_is_not_found() {
        let (app, _db) = test_app().await;
        let (_, learner) = sign_in(&app, "learner").await;
        let (status, _, _) = call(&app, "GET", "/api/books/1/chapters/1", Some(&learner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = call(&app, "GET", "/api/courses/1", Some(&learner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn locked_course_chapter_hides_video_next_chapter_and_attachments() {
        let (app, db) = test_app().await;
        let (_, author) = sign_in(&app, "author").await;
        let author = Some(author.as_str());
        let (_, course, _) =
            call(&app, "POST", "/api/courses", author, Some(json!({ "title": "Tokio" }))).await;
        let id = course["id"].as_i64().unwrap();
        let mut chapters = vec![];
        for (title, free) in [("Runtime", true), ("Channels", false), ("Select", false)] {
            let (_, chapter, _) = call(
                &app,
                "POST",
                &format!("/api/courses/{id}/chapters"),
                author,
                Some(json!({ "title": title })),
            )
            .await;
            let chapter_id = chapter["id"].as_i64().unwrap();
            let uri = format!("/api/courses/{id}/chapters/{chapter_id}");
            call(
                &app,
                "PATCH",
                &uri,
                author,
                Some(json!({
                    "body": format!("<p>{title}</p>"),
                    "videoUrl": format!("https://video.example/{title}"),
                    "isFreePreview": free
                })),
            )
            .await;
            let (status, _, _) = call(&app, "PATCH", &format!("{uri}/publish"), author, None).await;
            assert_eq!(status, StatusCode::OK);
            chapters.push(chapter_id);
        }
        let (status, _, _) = call(
            &app,
            "POST",
            &format!("/api/courses/{id}/attachments"),
            author,
            Some(json!({ "url": "https://files.example/tokio/exercises.zip" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        call(
            &app,
            "PATCH",
            &format!("/api/courses/{id}"),
            author,
            Some(json!({ "description": "Async", "imageUrl": "https://img.example/t.png", "price": 12 })),
        )
        .await;
        let (status, _, _) = call(&app, "PATCH", &format!("/api/courses/{id}/publish"), author, None).await;
        assert_eq!(status, StatusCode::OK);

        let (learner_id, learner) = sign_in(&app, "learner").await;
        let view = |unit_id: i64| {
            let app = app.clone();
            let learner = learner.clone();
            async move {
                let uri = format!("/api/courses/{id}/chapters/{unit_id}");
                let (status, view, _) = call(&app, "GET", &uri, Some(&learner), None).await;
                assert_eq!(status, StatusCode::OK);
                view
            }
        };

        let free = view(chapters[0]).await;
        assert_eq!(free["isLocked"], false);
        assert_eq!(free["unit"]["videoUrl"], "https://video.example/Runtime");
        assert_eq!(free["nextUnit"]["id"], chapters[1]);
        assert_eq!(free["nextUnit"]["title"], "Channels");
        assert_eq!(free["nextUnit"]["body"], "");
        assert!(free["nextUnit"]["videoUrl"].is_null());
        assert_eq!(free["attachments"], json!([]));

        let locked = view(chapters[1]).await;
        assert_eq!(locked["isLocked"], true);
        assert_eq!(locked["unit"]["title"], "Channels");
        assert_eq!(locked["unit"]["body"], "");
        assert!(locked["unit"]["videoUrl"].is_null());
        assert_eq!(locked["unit"]["quiz"], json!([]));
        assert_eq!(locked["nextUnit"]["id"], chapters[2]);
        assert_eq!(locked["nextUnit"]["body"], "");
        assert!(locked["nextUnit"]["videoUrl"].is_null());
        assert_eq!(locked["attachments"], json!([]));

        record_purchase(&db, learner_id, ParentKind::Course, id).await.unwrap();
        let free = view(chapters[0]).await;
        assert_eq!(free["nextUnit"]["videoUrl"], "https://video.example/Channels");
        assert_eq!(free["attachments"][0]["name"], "exercises.zip");
        let unlocked = view(chapters[1]).await;
        assert_eq!(unlocked["isLocked"], false);
        assert_eq!(unlocked["unit"]["videoUrl"], "https://video.example/Channels");
        assert_eq!(unlocked["nextUnit"]["body"], "<p>Select</p>");
    }
}
