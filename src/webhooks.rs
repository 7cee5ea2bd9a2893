use rocket::Route;

pub mod github;
pub use github::{discussion_hook_post, discussion_hook_put};

pub fn routes() -> Vec<Route> {
    rocket::routes![discussion_hook_post, discussion_hook_put]
}
