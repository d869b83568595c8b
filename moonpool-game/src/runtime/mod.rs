//! Runtime assembly: the shared core, the public handle and the
//! background maintenance loops.

mod builder;
mod game_runtime;
mod maintenance;
mod shared;

pub use builder::RuntimeBuilder;
pub use game_runtime::GameRuntime;
pub use maintenance::SaveReport;

pub(crate) use shared::RuntimeShared;
