//! End-to-end scenarios over the embedded server adapter: key ceremonies,
//! multi-device sync convergence, tombstone propagation, and crash recovery.

use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use passkeeper::auth::{AuthError, AuthService, Session};
use passkeeper::keychain::KdfParams;
use passkeeper::payload::{DecipheredPayload, ItemData, Metadata};
use passkeeper::record::{PrivateRecord, RecordState};
use passkeeper::remote::{
    AuthSuccess, DeleteRequest, DownloadRequest, LoginRequest, RegisterRequest, RemoteError,
    SaltParams, ServerAdapter, UpdateRequest, UploadRequest,
};
use passkeeper::server::adapter::EmbeddedServer;
use passkeeper::server::service::Backend;
use passkeeper::server::store::ServerStore;
use passkeeper::server::token::TokenSigner;
use passkeeper::store::LocalStore;
use passkeeper::sync::{CancelFlag, SyncEngine, SyncOutcome};
use passkeeper::vault::{VaultError, VaultService};

struct TestServer {
    _dir: tempfile::TempDir,
    adapter: EmbeddedServer,
}

fn test_server() -> TestServer {
    let dir = tempfile::tempdir().expect("server dir");
    let store = ServerStore::open(&dir.path().join("server.db")).expect("server store");
    let backend = Backend::new(store, TokenSigner::new("integration-secret", 3600));
    TestServer {
        _dir: dir,
        adapter: EmbeddedServer::new(Arc::new(backend)),
    }
}

struct Device {
    _dir: tempfile::TempDir,
    store: LocalStore,
    session_path: PathBuf,
}

fn device() -> Device {
    let dir = tempfile::tempdir().expect("device dir");
    let store = LocalStore::open(&dir.path().join("client.db")).expect("client store");
    let session_path = dir.path().join("session.json");
    Device {
        _dir: dir,
        store,
        session_path,
    }
}

impl Device {
    fn auth<'a>(&'a self, remote: &'a dyn ServerAdapter) -> AuthService<'a> {
        AuthService::new(
            remote,
            &self.store,
            &self.session_path,
            KdfParams::for_tests(),
            KdfParams::for_tests(),
        )
    }

    fn vault<'a>(&'a self, remote: &'a dyn ServerAdapter) -> VaultService<'a> {
        VaultService::new(&self.store, remote)
    }

    fn sync(&self, remote: &dyn ServerAdapter, session: &Session) -> SyncOutcome {
        SyncEngine::new(&self.store, remote)
            .full_sync(session, &CancelFlag::default())
            .expect("sync pass")
    }
}

fn pw(text: &str) -> SecretString {
    SecretString::new(text.to_string().into_boxed_str())
}

fn login_item(name: &str, username: &str, password: &str) -> DecipheredPayload {
    DecipheredPayload {
        metadata: Metadata {
            name: name.to_string(),
            folder: None,
        },
        data: ItemData::LoginPassword {
            username: username.to_string(),
            password: password.to_string(),
            urls: Vec::new(),
        },
        notes: None,
        additional_fields: None,
    }
}

fn server_state(server: &TestServer, session: &Session, id: &str) -> RecordState {
    server
        .adapter
        .get_server_states(&session.token, session.user_id)
        .expect("server states")
        .into_iter()
        .find(|state| state.client_side_id == id)
        .expect("record on server")
}

#[test]
fn register_then_login_recovers_the_same_dek() {
    let server = test_server();
    let client = device();
    let auth = client.auth(&server.adapter);

    let registered = auth
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let original_dek = registered.dek().expose_secret().to_vec();
    auth.logout(registered).expect("logout");

    let restored = auth.login("alice", &pw("pw")).expect("login");
    assert_eq!(restored.dek().expose_secret(), original_dek.as_slice());

    let wrong = auth.login("alice", &pw("pw2")).unwrap_err();
    assert!(matches!(wrong, AuthError::InvalidCredentials));
}

#[test]
fn session_restore_unlocks_with_the_master_password() {
    let server = test_server();
    let client = device();
    let auth = client.auth(&server.adapter);

    let session = auth
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let original_dek = session.dek().expose_secret().to_vec();
    drop(session);

    let persisted = auth.restore().expect("restore").expect("session persisted");
    assert_eq!(persisted.user_id, 1);

    let unlocked = auth.unlock(&persisted, &pw("pw")).expect("unlock");
    assert_eq!(unlocked.dek().expose_secret(), original_dek.as_slice());

    let wrong = auth.unlock(&persisted, &pw("nope")).unwrap_err();
    assert!(matches!(wrong, AuthError::InvalidCredentials));
}

#[test]
fn create_and_read_roundtrip_and_the_server_sees_no_plaintext() {
    let server = test_server();
    let client = device();
    let session = client
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");

    let vault = client.vault(&server.adapter);
    let outcome = vault
        .create(&session, &login_item("gmail", "a@x", "s3cret"))
        .expect("create");
    assert!(outcome.uploaded);

    let read = vault.read(&session, &outcome.client_side_id).expect("read");
    assert_eq!(read, login_item("gmail", "a@x", "s3cret"));

    // The server-side copy is sealed: no field of it contains the secret.
    let request = DownloadRequest {
        user_id: session.user_id,
        client_side_ids: vec![outcome.client_side_id.clone()],
        length: 1,
    };
    let stored = server
        .adapter
        .download(&session.token, &request)
        .expect("download");
    assert_eq!(stored.len(), 1);
    let blob = serde_json::to_string(&stored[0].payload).expect("serialize payload");
    assert!(!blob.contains("s3cret"));
    assert!(!blob.contains("gmail"));
    assert!(!blob.contains("a@x"));
}

#[test]
fn foreground_update_bumps_versions_in_lockstep() {
    let server = test_server();
    let client = device();
    let session = client
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault = client.vault(&server.adapter);

    let id = vault
        .create(&session, &login_item("gmail", "a@x", "one"))
        .expect("create")
        .client_side_id;
    assert_eq!(client.store.get(session.user_id, &id).unwrap().version, 1);

    vault
        .update(&session, &id, &login_item("gmail", "a@x", "two"))
        .expect("update");

    assert_eq!(client.store.get(session.user_id, &id).unwrap().version, 2);
    assert_eq!(server_state(&server, &session, &id).version, 2);
}

#[test]
fn optimistic_update_race_is_detected_then_resolved_by_sync() {
    let server = test_server();

    let device_x = device();
    let session_x = device_x
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault_x = device_x.vault(&server.adapter);

    let device_y = device();
    let session_y = device_y
        .auth(&server.adapter)
        .login("alice", &pw("pw"))
        .expect("login");
    let vault_y = device_y.vault(&server.adapter);

    // Both devices observe version 1.
    let id = vault_x
        .create(&session_x, &login_item("shared", "a@x", "base"))
        .expect("create")
        .client_side_id;
    device_y.sync(&server.adapter, &session_y);
    assert_eq!(device_y.store.get(session_y.user_id, &id).unwrap().version, 1);

    // X wins the race; the server moves to version 2.
    vault_x
        .update(&session_x, &id, &login_item("shared", "a@x", "from-x"))
        .expect("x update");

    // Y's competing update is rejected, not merged.
    let conflict = vault_y
        .update(&session_y, &id, &login_item("shared", "a@x", "from-y"))
        .unwrap_err();
    assert!(matches!(conflict, VaultError::Conflict));
    assert_eq!(device_y.store.get(session_y.user_id, &id).unwrap().version, 1);

    // Sync downloads the winner; re-applying the edit lands on version 3.
    device_y.sync(&server.adapter, &session_y);
    assert_eq!(
        vault_y.read(&session_y, &id).expect("read after sync"),
        login_item("shared", "a@x", "from-x")
    );

    vault_y
        .update(&session_y, &id, &login_item("shared", "a@x", "from-y"))
        .expect("retry update");
    assert_eq!(server_state(&server, &session_y, &id).version, 3);
    assert_eq!(device_y.store.get(session_y.user_id, &id).unwrap().version, 3);
}

#[test]
fn delete_propagates_as_a_tombstone_to_other_devices() {
    let server = test_server();

    let device_a = device();
    let session_a = device_a
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault_a = device_a.vault(&server.adapter);

    let device_b = device();
    let session_b = device_b
        .auth(&server.adapter)
        .login("alice", &pw("pw"))
        .expect("login");

    let id = vault_a
        .create(&session_a, &login_item("doomed", "a@x", "x"))
        .expect("create")
        .client_side_id;
    device_b.sync(&server.adapter, &session_b);

    vault_a.delete(&session_a, &id).expect("delete");

    let state = server_state(&server, &session_a, &id);
    assert!(state.deleted);
    assert_eq!(state.version, 2);
    assert_eq!(device_a.store.get(session_a.user_id, &id).unwrap().version, 2);

    let outcome = device_b.sync(&server.adapter, &session_b);
    assert_eq!(outcome.tombstoned_locally, 1);
    let local = device_b.store.get(session_b.user_id, &id).expect("tombstone");
    assert!(local.deleted);
    assert_eq!(local.version, 2);

    // Tombstoned records read as gone.
    let err = device_b
        .vault(&server.adapter)
        .read(&session_b, &id)
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound));
}

/// Delegates to the embedded server unless switched offline, in which case
/// every call fails like an unreachable host.
struct FlakyServer {
    inner: EmbeddedServer,
    offline: AtomicBool,
}

impl FlakyServer {
    fn new(inner: EmbeddedServer) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
        }
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

impl ServerAdapter for FlakyServer {
    fn register(&self, request: &RegisterRequest) -> Result<AuthSuccess, RemoteError> {
        self.check()?;
        self.inner.register(request)
    }

    fn request_salt(&self, login: &str) -> Result<SaltParams, RemoteError> {
        self.check()?;
        self.inner.request_salt(login)
    }

    fn login(&self, request: &LoginRequest) -> Result<AuthSuccess, RemoteError> {
        self.check()?;
        self.inner.login(request)
    }

    fn upload(&self, token: &str, request: &UploadRequest) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.upload(token, request)
    }

    fn download(
        &self,
        token: &str,
        request: &DownloadRequest,
    ) -> Result<Vec<PrivateRecord>, RemoteError> {
        self.check()?;
        self.inner.download(token, request)
    }

    fn update(&self, token: &str, request: &UpdateRequest) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.update(token, request)
    }

    fn delete(&self, token: &str, request: &DeleteRequest) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.delete(token, request)
    }

    fn get_server_states(
        &self,
        token: &str,
        user_id: i64,
    ) -> Result<Vec<RecordState>, RemoteError> {
        self.check()?;
        self.inner.get_server_states(token, user_id)
    }
}

#[test]
fn offline_create_is_staged_and_uploaded_by_the_next_sync() {
    let server = test_server();
    let flaky = FlakyServer::new(server.adapter.clone());

    let client = device();
    let session = client
        .auth(&flaky)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault = client.vault(&flaky);

    flaky.set_offline(true);
    let outcome = vault
        .create(&session, &login_item("offline", "a@x", "secret"))
        .expect("offline create stages locally");
    assert!(!outcome.uploaded);
    let id = outcome.client_side_id;

    // The record exists locally at version 1; the server has never seen it.
    assert_eq!(client.store.get(session.user_id, &id).unwrap().version, 1);

    // Sync while still offline aborts cleanly.
    let aborted = SyncEngine::new(&client.store, &flaky)
        .full_sync(&session, &CancelFlag::default());
    assert!(aborted.is_err());

    flaky.set_offline(false);
    let outcome = client.sync(&flaky, &session);
    assert_eq!(outcome.uploaded, 1);

    let state = server_state(&server, &session, &id);
    assert_eq!(state.version, 1);
    assert!(!state.deleted);

    // Nothing left to do.
    let second = client.sync(&flaky, &session);
    assert_eq!(second, SyncOutcome {
        unchanged: 1,
        ..SyncOutcome::default()
    });
}

#[test]
fn staged_update_after_a_crash_is_pushed_by_the_next_sync() {
    let server = test_server();
    let client = device();
    let session = client
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault = client.vault(&server.adapter);

    let id = vault
        .create(&session, &login_item("gmail", "a@x", "one"))
        .expect("create")
        .client_side_id;

    // Simulate a crash between the local write and the server call: stage a
    // new payload at the same version, directly against the store.
    let record = client.store.get(session.user_id, &id).unwrap();
    let fresh = passkeeper::payload::encrypt_payload(
        &login_item("gmail", "a@x", "two"),
        session.dek(),
    )
    .expect("seal");
    let staged = PrivateRecord {
        hash: passkeeper::payload::compute_hash(&fresh).expect("hash"),
        payload: fresh,
        ..record
    };
    client.store.update(&staged).expect("stage");

    // Same version on both sides, different hashes: the engine pushes.
    let outcome = client.sync(&server.adapter, &session);
    assert_eq!(outcome.pushed_updates, 1);

    assert_eq!(server_state(&server, &session, &id).version, 2);
    assert_eq!(client.store.get(session.user_id, &id).unwrap().version, 2);
    assert_eq!(
        vault.read(&session, &id).expect("read"),
        login_item("gmail", "a@x", "two")
    );

    // Idempotent thereafter.
    let second = client.sync(&server.adapter, &session);
    assert_eq!(second.pushed_updates, 0);
    assert_eq!(second.downloaded, 0);
}

#[test]
fn local_tombstone_that_never_reached_the_server_is_purged() {
    let server = test_server();
    let flaky = FlakyServer::new(server.adapter.clone());

    let client = device();
    let session = client
        .auth(&flaky)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault = client.vault(&flaky);

    flaky.set_offline(true);
    let id = vault
        .create(&session, &login_item("ephemeral", "a@x", "x"))
        .expect("offline create")
        .client_side_id;
    client.store.soft_delete(session.user_id, &id).expect("tombstone");

    flaky.set_offline(false);
    let outcome = client.sync(&flaky, &session);
    assert_eq!(outcome.purged_locally, 1);
    assert!(client.store.get(session.user_id, &id).is_err());
    assert!(
        server
            .adapter
            .get_server_states(&session.token, session.user_id)
            .expect("states")
            .is_empty()
    );
}

#[test]
fn cross_device_convergence_in_one_pass() {
    let server = test_server();

    let device_a = device();
    let session_a = device_a
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");
    let vault_a = device_a.vault(&server.adapter);

    let r2 = vault_a
        .create(&session_a, &login_item("r2", "a@x", "old"))
        .expect("create r2")
        .client_side_id;
    let r3 = vault_a
        .create(&session_a, &login_item("r3", "a@x", "x"))
        .expect("create r3")
        .client_side_id;

    // Device B captures the pre-change state.
    let device_b = device();
    let session_b = device_b
        .auth(&server.adapter)
        .login("alice", &pw("pw"))
        .expect("login");
    device_b.sync(&server.adapter, &session_b);

    // Device A creates R1, modifies R2, deletes R3.
    let r1 = vault_a
        .create(&session_a, &login_item("r1", "a@x", "new"))
        .expect("create r1")
        .client_side_id;
    vault_a
        .update(&session_a, &r2, &login_item("r2", "a@x", "new-password"))
        .expect("update r2");
    vault_a.delete(&session_a, &r3).expect("delete r3");

    // One pass on B yields A's view.
    device_b.sync(&server.adapter, &session_b);
    let vault_b = device_b.vault(&server.adapter);

    assert_eq!(
        vault_b.read(&session_b, &r1).expect("r1"),
        login_item("r1", "a@x", "new")
    );
    assert_eq!(
        vault_b.read(&session_b, &r2).expect("r2"),
        login_item("r2", "a@x", "new-password")
    );
    assert_eq!(device_b.store.get(session_b.user_id, &r2).unwrap().version, 2);
    assert!(device_b.store.get(session_b.user_id, &r3).unwrap().deleted);

    // A second pass on either device is a no-op.
    let again_b = device_b.sync(&server.adapter, &session_b);
    assert_eq!(again_b, SyncOutcome {
        unchanged: 3,
        ..SyncOutcome::default()
    });
    let again_a = device_a.sync(&server.adapter, &session_a);
    assert_eq!(again_a, SyncOutcome {
        unchanged: 3,
        ..SyncOutcome::default()
    });
}

#[test]
fn sync_cancellation_stops_between_actions_and_the_next_pass_finishes() {
    let server = test_server();
    let client = device();
    let session = client
        .auth(&server.adapter)
        .register("alice", "Alice", &pw("pw"), None)
        .expect("register");

    // Another device pushes records this client has never seen.
    let device_b = device();
    let session_b = device_b
        .auth(&server.adapter)
        .login("alice", &pw("pw"))
        .expect("login");
    let vault_b = device_b.vault(&server.adapter);
    for index in 0..3 {
        vault_b
            .create(&session_b, &login_item(&format!("r{index}"), "a@x", "x"))
            .expect("create");
    }

    // A pre-cancelled pass does nothing but report cancellation.
    let cancel = CancelFlag::default();
    cancel.cancel();
    let outcome = SyncEngine::new(&client.store, &server.adapter)
        .full_sync(&session, &cancel)
        .expect("cancelled pass");
    assert!(outcome.cancelled);
    assert_eq!(outcome.downloaded, 0);

    // The next, uncancelled pass converges.
    let outcome = client.sync(&server.adapter, &session);
    assert_eq!(outcome.downloaded, 3);
}
