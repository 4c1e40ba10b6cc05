mod middleware;
mod public;

pub use middleware::{IdentityHeader, RequestContext};
pub use public::{HttpState, build_router};
