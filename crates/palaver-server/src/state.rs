use std::sync::Arc;

use palaver::providers::base::Provider;
use palaver::store::ConversationStore;

use crate::auth::Authenticator;

/// Shared application state: the three collaborator seams behind traits,
/// so backends stay swappable and independently testable.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub provider: Arc<dyn Provider>,
    pub authenticator: Arc<dyn Authenticator>,
}
