pub mod canonical;
pub mod codec;
pub mod error;
pub mod gc;
pub mod grammar;
pub mod merge;
pub mod node;
pub mod pretty;
pub mod protocol;
pub mod selector;
pub mod smart;
pub mod store;
pub mod update;

pub use error::{Result, SmartRecordError};
pub use grammar::{Grammar, MetadataOptions};
pub use node::{Dict, Metadata, Node, Predicate, Set, Value};
pub use smart::peer::PeerId;
pub use store::{Store, StoreConfig, UpdateOptions};
