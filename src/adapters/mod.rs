pub mod config_store;
pub mod http_client;
pub mod local_synthesis;
pub mod native_synthesis;
pub mod preference_store;
pub mod recognizer;
pub mod remote_synthesis;

pub use config_store::TomlConfigStore;
pub use http_client::GuardedHttpClient;
pub use local_synthesis::LocalSynthesisAdapter;
pub use native_synthesis::NativeSynthesisAdapter;
pub use preference_store::TomlPreferenceStore;
pub use recognizer::{PlatformRecognizer, RecognizerEventHandler};
pub use remote_synthesis::RemoteSynthesisAdapter;
