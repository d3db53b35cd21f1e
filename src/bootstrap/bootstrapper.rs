use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{BackendError, InterviewBackend};
use super::messages::{CreatedSession, InterviewConfig};

type Creation = Shared<BoxFuture<'static, Result<CreatedSession, BackendError>>>;

struct Entry {
    generation: u64,
    creation: Creation,
}

/// Creates backend sessions, at most one per distinct config
///
/// Calls with a config whose fingerprint is already known share the same
/// creation, whether it is still in flight or already finished. A failed
/// creation is forgotten so the next call tries again; a successful one is
/// kept until `release`.
pub struct SessionBootstrapper {
    backend: Arc<dyn InterviewBackend>,
    sessions: Mutex<HashMap<u64, Entry>>,
    next_generation: AtomicU64,
}

impl SessionBootstrapper {
    pub fn new(backend: Arc<dyn InterviewBackend>) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> Arc<dyn InterviewBackend> {
        self.backend.clone()
    }

    pub async fn create_session(
        &self,
        config: &InterviewConfig,
    ) -> Result<CreatedSession, BackendError> {
        let key = config.fingerprint();

        let (generation, creation) = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&key) {
                Some(entry) => {
                    debug!("Reusing session creation for config {:016x}", key);
                    (entry.generation, entry.creation.clone())
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                    let backend = self.backend.clone();
                    let config = config.clone();
                    let creation = async move { backend.create_session(&config).await }
                        .boxed()
                        .shared();
                    sessions.insert(
                        key,
                        Entry {
                            generation,
                            creation: creation.clone(),
                        },
                    );
                    (generation, creation)
                }
            }
        };

        let result = creation.await;

        if let Err(e) = &result {
            warn!("Session creation failed: {}", e);
            let mut sessions = self.sessions.lock().await;
            if sessions.get(&key).map(|entry| entry.generation) == Some(generation) {
                sessions.remove(&key);
            }
        }

        result
    }

    /// Forget the session created for `config`; returns whether one was held
    pub async fn release(&self, config: &InterviewConfig) -> bool {
        let released = self
            .sessions
            .lock()
            .await
            .remove(&config.fingerprint())
            .is_some();
        if released {
            info!("Released session for {} ({})", config.job_role, config.user_id);
        }
        released
    }

    pub async fn is_held(&self, config: &InterviewConfig) -> bool {
        self.sessions.lock().await.contains_key(&config.fingerprint())
    }
}
