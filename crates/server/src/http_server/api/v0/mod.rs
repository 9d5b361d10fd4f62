use axum::routing::{get, post, put};
use axum::Router;

pub mod keys;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route(
            "/keys/",
            get(keys::list::handler).post(keys::create::handler),
        )
        .route(
            "/keys/:key_id/",
            get(keys::get::handler).delete(keys::delete::handler),
        )
        .route(
            "/keys/:key_id/access/",
            get(keys::access::get_handler).put(keys::access::put_handler),
        )
        .route("/keys/:key_id/versions/", post(keys::versions::add_handler))
        .route(
            "/keys/:key_id/versions/:version_id/",
            put(keys::versions::update_handler),
        )
        .with_state(state)
}
