//! Home feed extraction.
//!
//! A [`PageSession`] fetches the logged-in home timeline, walks its post
//! containers and turns each into a [`Post`], issuing continuation fetches for
//! truncated text, multi-picture galleries and videos.

pub mod assemble;
pub mod client;
pub mod continuation;
pub mod error;
pub mod extract;
pub mod markup;
pub mod normalize;
pub mod post;
pub mod session;
pub mod time;

pub use assemble::{PostAssembler, PostDraft};
pub use client::{Endpoints, FeedClient, HttpFeedClient};
pub use continuation::ContinuationResolver;
pub use error::{FeedError, FetchError, PICTURE_SETTINGS_URL};
pub use normalize::normalize_text;
pub use post::Post;
pub use session::{FeedPage, PageSession, PageSnapshot};
