use rocket::{
    data::{ByteUnit, Data},
    State,
};
use tracing::{debug, trace, warn};

mod events;
pub use events::*;

pub mod origin;
use origin::RequestOrigin;

use crate::notifier::Notifier;

pub const NO_CONTENT: &str = "No content\n";
pub const DELIVERED: &str = "Delivered\n";

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

#[rocket::post("/hook", data = "<payload>")]
pub async fn discussion_hook_post(
    origin: RequestOrigin,
    payload: Data<'_>,
    notifier: &State<Notifier>,
) -> &'static str {
    receive(origin, payload, notifier).await
}

#[rocket::put("/hook", data = "<payload>")]
pub async fn discussion_hook_put(
    origin: RequestOrigin,
    payload: Data<'_>,
    notifier: &State<Notifier>,
) -> &'static str {
    receive(origin, payload, notifier).await
}

async fn receive(origin: RequestOrigin, payload: Data<'_>, notifier: &Notifier) -> &'static str {
    if !origin.trusted {
        trace!("rejecting request from untrusted origin {:?}", origin.addr);
        return NO_CONTENT;
    }

    let content = match payload.open(LIMIT).into_string().await {
        Ok(s) if s.is_complete() => s.into_inner(),
        Ok(_) => {
            warn!("payload from {:?} was too big, ignoring it", origin.addr);
            return NO_CONTENT;
        }
        Err(e) => {
            debug!("couldn't read payload: {}", e);
            return NO_CONTENT;
        }
    };

    let event: DiscussionPayload = match serde_json::from_str(&content) {
        Ok(event) => event,
        Err(e) => {
            debug!("payload isn't a discussion event: {}", e);
            return NO_CONTENT;
        }
    };

    // every discussion event carries a discussion, anything else isn't for us
    if event.discussion.is_none() {
        trace!("payload has no discussion, ignoring it");
        return NO_CONTENT;
    }

    let outcome = notifier.handle(&event).await;
    warn!("{}", outcome);

    DELIVERED
}
