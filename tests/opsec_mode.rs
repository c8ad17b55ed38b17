//! OPSEC mode: no persistent writes, volatile stores, panic wipe.

mod common;

use std::collections::BTreeMap;
use std::path::Path;

use common::TestContext;
use keychainpgp_keyring::Error;

/// Every file under the data dir, by content. WAL and shm files churn
/// on SQLite connections, so the snapshot captures exact bytes.
fn snapshot_dir(root: &Path) -> BTreeMap<std::path::PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let bytes = std::fs::read(&path).unwrap();
                files.insert(path, bytes);
            }
        }
    }
    files
}

#[tokio::test]
async fn opsec_session_writes_nothing_to_disk() {
    let ctx = TestContext::new().await.unwrap();
    let before = snapshot_dir(ctx.data_dir.path());

    ctx.service.enable_opsec();
    assert!(ctx.service.opsec_status());

    let generated = ctx
        .service
        .generate_key_pair("Ghost", "ghost@example.com", None)
        .await
        .unwrap();
    let fingerprint = generated.record.fingerprint.as_str().to_string();

    let ciphertext = ctx
        .service
        .encrypt(b"ephemeral", &[fingerprint.clone()])
        .await
        .unwrap();
    let decrypted = ctx.service.decrypt(&ciphertext, None).await.unwrap();
    assert_eq!(decrypted.plaintext, b"ephemeral");

    let after = snapshot_dir(ctx.data_dir.path());
    assert_eq!(before, after, "OPSEC session leaked bytes to disk");
}

#[tokio::test]
async fn opsec_keyring_is_separate_and_volatile() {
    let ctx = TestContext::new().await.unwrap();

    let persistent = ctx
        .service
        .generate_key_pair("Alice", "alice@example.com", None)
        .await
        .unwrap();

    ctx.service.enable_opsec();

    // The persistent keyring is invisible while OPSEC is on.
    assert!(ctx.service.list_keys().await.unwrap().is_empty());

    let ghost = ctx
        .service
        .generate_key_pair("Ghost", "ghost@example.com", None)
        .await
        .unwrap();
    assert_eq!(ctx.service.list_keys().await.unwrap().len(), 1);

    ctx.service.disable_opsec().await.unwrap();

    // Back to the persistent keyring; the OPSEC key is gone for good.
    let keys = ctx.service.list_keys().await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].fingerprint, persistent.record.fingerprint);
    assert!(matches!(
        ctx.service.get_key(ghost.record.fingerprint.as_str()).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn panic_wipe_strands_all_secrets() {
    let ctx = TestContext::new().await.unwrap();

    ctx.service.enable_opsec();
    let generated = ctx
        .service
        .generate_key_pair("Ghost", "ghost@example.com", None)
        .await
        .unwrap();
    let fingerprint = generated.record.fingerprint.as_str().to_string();
    let ciphertext = ctx
        .service
        .encrypt(b"ephemeral", &[fingerprint.clone()])
        .await
        .unwrap();

    ctx.service.panic_wipe().await.unwrap();

    // The volatile keyring is empty and the wrapping key is gone.
    assert!(ctx.service.list_keys().await.unwrap().is_empty());
    let result = ctx.service.decrypt(&ciphertext, None).await;
    assert!(matches!(
        result,
        Err(Error::SessionLost) | Err(Error::WrongKey) | Err(Error::NotFound { .. })
    ));

    // New secrets cannot be wrapped under a wiped session key.
    let generate = ctx
        .service
        .generate_key_pair("Again", "again@example.com", None)
        .await;
    assert!(matches!(generate, Err(Error::SessionLost)));
}

#[tokio::test]
async fn panic_wipe_also_kills_persistent_session_secrets() {
    let ctx = TestContext::new().await.unwrap();

    let generated = ctx
        .service
        .generate_key_pair("Alice", "alice@example.com", None)
        .await
        .unwrap();
    let fingerprint = generated.record.fingerprint.as_str().to_string();
    let ciphertext = ctx
        .service
        .encrypt(b"hello", &[fingerprint])
        .await
        .unwrap();

    ctx.service.panic_wipe().await.unwrap();

    // The wrapped secret is still on disk but unreadable forever.
    let result = ctx.service.decrypt(&ciphertext, None).await;
    assert!(matches!(result, Err(Error::SessionLost)));
}
