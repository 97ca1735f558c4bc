//! Script-to-page bridge: embeds QuickJS behind a handle-based boundary over
//! a kuchiki document tree. Scripts observe and mutate the live tree, receive
//! events, and trigger re-rendering, while the host stays authoritative over
//! state and is isolated from script faults.

pub mod bridge;
pub mod dom;
pub mod engine;
pub mod error;
pub mod events;
pub mod handles;
pub mod processor;
pub mod script;
pub mod session;

pub use bridge::PageBridge;
pub use dom::{NullRenderer, PageDom, Renderer};
pub use error::BridgeError;
pub use events::{DefaultAction, EventDispatcher, KeyDisposition};
pub use handles::{Handle, HandleTable};
pub use processor::{collect_scripts, ScriptExecutionSummary};
pub use script::{ScriptDescriptor, ScriptExecution, ScriptKind, ScriptSource};
pub use session::PageSession;
