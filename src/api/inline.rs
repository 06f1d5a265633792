use log::debug;
use rocket::response::status::NoContent;
use rocket::serde::json::Json;
use rocket::State;

use crate::api::ApiError;
use crate::debounce::{Debounced, Debouncer, SettleWindows};
use crate::models::{InlineQuery, SearchResponse};
use crate::upstream::SearchService;

#[derive(Responder)]
pub enum InlineReply {
    Results(Json<SearchResponse>),
    /// A newer query from the same user took over, or the server is stopping.
    Dropped(NoContent),
}

/// Inline query entry point. Bursts from one user collapse into the last query.
#[get("/inline?<user>&<query>&<offset>")]
pub async fn inline(
    user: String,
    query: Option<String>,
    offset: Option<String>,
    debouncer: &State<Debouncer<String>>,
    search: &State<SearchService>,
    windows: &State<SettleWindows>,
) -> Result<InlineReply, ApiError> {
    let query = InlineQuery::new(user, query.unwrap_or_default(), offset.unwrap_or_default());

    let settle = if search.is_cached(&query) {
        windows.quick
    } else {
        windows.for_query(&query)
    };
    debug!("Query '{}' from {} settles in {:?}", query.text, query.requester, settle);

    let outcome = debouncer
        .run(query.requester.clone(), settle, || search.run(&query))
        .await?;

    Ok(match outcome {
        Debounced::Dispatched(response) => InlineReply::Results(Json(response)),
        Debounced::Superseded | Debounced::Released => InlineReply::Dropped(NoContent),
    })
}
