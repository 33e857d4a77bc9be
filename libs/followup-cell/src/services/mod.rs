pub mod dispatcher;
pub mod recurrence;
pub mod retry;
pub mod sender;
pub mod store;

pub use dispatcher::*;
pub use recurrence::*;
pub use retry::*;
pub use sender::*;
pub use store::*;
