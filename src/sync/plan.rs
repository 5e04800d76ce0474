//! Action classification: what to do for every record id seen on either side.

use std::collections::BTreeMap;

use crate::record::RecordState;

/// The reconciler's verdict for one `client_side_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Server has a live record we have never seen.
    DownloadCreate,
    /// Server moved past us; replace the local row.
    DownloadOverwrite,
    /// Local record the server has never seen.
    Upload,
    /// Local change the server has not accepted yet.
    UpdateServer,
    /// Local tombstone the server is not yet aware of.
    DeleteServer,
    /// Server tombstoned; mirror it locally.
    DeleteLocal,
    /// Tombstone that never reached the server; drop the local row.
    LocalPurge,
    /// Server-side tombstone for a record we never knew; nothing to mirror.
    Ignore,
    Noop,
}

/// Classify one record from its `(local, server)` state pair.
///
/// Equal versions with differing hashes mean a staged local write the server
/// never acknowledged (crash or offline between the local write and the
/// server call); that is pushed, not ignored.
pub fn classify(local: Option<&RecordState>, server: Option<&RecordState>) -> SyncAction {
    match (local, server) {
        (None, None) => SyncAction::Noop,
        (None, Some(server)) => {
            if server.deleted {
                SyncAction::Ignore
            } else {
                SyncAction::DownloadCreate
            }
        }
        (Some(local), None) => {
            if local.deleted {
                SyncAction::LocalPurge
            } else {
                SyncAction::Upload
            }
        }
        (Some(local), Some(server)) => match (local.deleted, server.deleted) {
            (true, true) => SyncAction::Noop,
            (false, true) => SyncAction::DeleteLocal,
            (true, false) => SyncAction::DeleteServer,
            (false, false) => {
                if local.version > server.version {
                    SyncAction::UpdateServer
                } else if local.version < server.version {
                    SyncAction::DownloadOverwrite
                } else if local.hash == server.hash {
                    SyncAction::Noop
                } else {
                    SyncAction::UpdateServer
                }
            }
        },
    }
}

/// The full pass, bucketed by execution phase. Ids inside a bucket are in
/// lexical order; cross-record order within a phase is unspecified anyway.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub delete_server: Vec<String>,
    pub update_server: Vec<String>,
    pub upload: Vec<String>,
    pub download_create: Vec<String>,
    pub download_overwrite: Vec<String>,
    pub delete_local: Vec<String>,
    pub purge_local: Vec<String>,
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.delete_server.is_empty()
            && self.update_server.is_empty()
            && self.upload.is_empty()
            && self.download_create.is_empty()
            && self.download_overwrite.is_empty()
            && self.delete_local.is_empty()
            && self.purge_local.is_empty()
    }
}

pub fn build_plan(local: &[RecordState], server: &[RecordState]) -> SyncPlan {
    let local_by_id: BTreeMap<&str, &RecordState> = local
        .iter()
        .map(|state| (state.client_side_id.as_str(), state))
        .collect();
    let server_by_id: BTreeMap<&str, &RecordState> = server
        .iter()
        .map(|state| (state.client_side_id.as_str(), state))
        .collect();

    let mut ids: Vec<&str> = local_by_id.keys().chain(server_by_id.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut plan = SyncPlan::default();
    for id in ids {
        let action = classify(
            local_by_id.get(id).copied(),
            server_by_id.get(id).copied(),
        );
        let bucket = match action {
            SyncAction::DeleteServer => &mut plan.delete_server,
            SyncAction::UpdateServer => &mut plan.update_server,
            SyncAction::Upload => &mut plan.upload,
            SyncAction::DownloadCreate => &mut plan.download_create,
            SyncAction::DownloadOverwrite => &mut plan.download_overwrite,
            SyncAction::DeleteLocal => &mut plan.delete_local,
            SyncAction::LocalPurge => &mut plan.purge_local,
            SyncAction::Ignore | SyncAction::Noop => {
                plan.unchanged += 1;
                continue;
            }
        };
        bucket.push(id.to_string());
    }
    plan
}
