pub mod change;
pub mod feed;
pub mod folder;
pub mod item;
pub mod user;
pub mod window;

pub use change::{Flag, MarkAction};
pub use feed::Feed;
pub use folder::Folder;
pub use item::Item;
pub use user::User;
pub use window::{TemporaryFeed, WindowKind};
