pub mod cursor;
pub mod id;
pub mod post;

pub use cursor::{PageCursor, LAST_PAGE_SENTINEL};
pub use id::{AccountId, PostId, SourceTag};
pub use post::CanonicalPost;
