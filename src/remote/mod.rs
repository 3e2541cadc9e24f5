pub mod protocol;
pub mod scripts;

pub use protocol::{RemoteHost, RemotePublisher};
pub use scripts::{APT_SCRIPT, CREATEREPO_SCRIPT, RemoteScript};
