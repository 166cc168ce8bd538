use crate::auth::TokenKeys;
use crate::blob::BlobStore;
use crate::cli::TraineeGroupPolicy;
use axum::extract::FromRef;
use deadpool_diesel::postgres::Pool;
use std::sync::Arc;

/// Rules of the assignment graph that are a deployment decision rather than a schema constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentPolicy {
    pub trainee_groups: TraineeGroupPolicy,
    /// Leaves `/groupes/assigner-stagiaire` reachable without a token.
    pub open_trainee_enrollment: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub tokens: Arc<TokenKeys>,
    pub blobs: Arc<dyn BlobStore>,
    pub policy: AssignmentPolicy,
}

impl FromRef<AppState> for Pool {
    fn from_ref(state: &AppState) -> Pool {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<TokenKeys> {
    fn from_ref(state: &AppState) -> Arc<TokenKeys> {
        state.tokens.clone()
    }
}

impl FromRef<AppState> for Arc<dyn BlobStore> {
    fn from_ref(state: &AppState) -> Arc<dyn BlobStore> {
        state.blobs.clone()
    }
}

impl FromRef<AppState> for AssignmentPolicy {
    fn from_ref(state: &AppState) -> AssignmentPolicy {
        state.policy
    }
}
