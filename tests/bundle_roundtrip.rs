//! Transfer bundle tests: export, QR reassembly, import.

mod common;

use common::TestContext;
use keychainpgp_keyring::bundle::PartCollector;
use keychainpgp_keyring::Error;

/// Three own keys plus one contact, as in a realistic sync.
async fn seeded_context() -> (TestContext, Vec<String>, String) {
    let ctx = TestContext::new().await.unwrap();

    let mut own = Vec::new();
    for (name, email) in [
        ("Alice", "alice@example.com"),
        ("Alice Work", "alice@work.example"),
        ("Alice Backup", "backup@example.com"),
    ] {
        let generated = ctx
            .service
            .generate_key_pair(name, email, None)
            .await
            .unwrap();
        own.push(generated.record.fingerprint.as_str().to_string());
    }

    // The contact key comes from another keyring.
    let other = TestContext::new().await.unwrap();
    let contact = other
        .service
        .generate_key_pair("Bob", "bob@example.com", None)
        .await
        .unwrap();
    let contact_cert = other
        .service
        .export_key(contact.record.fingerprint.as_str(), false)
        .await
        .unwrap();
    ctx.service.import_key(contact_cert.expose()).await.unwrap();

    (ctx, own, contact.record.fingerprint.as_str().to_string())
}

fn passphrase_shape_ok(passphrase: &str) -> bool {
    let groups: Vec<&str> = passphrase.split('-').collect();
    groups.len() == 9
        && groups
            .iter()
            .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_digit()))
}

#[tokio::test]
async fn bundle_round_trip_restores_every_key() {
    let (ctx, own, contact) = seeded_context().await;

    let bundle = ctx.service.export_bundle(false).await.unwrap();
    assert!(passphrase_shape_ok(&bundle.passphrase));

    // "Wipe" by importing into a completely fresh keyring.
    let restored = TestContext::new().await.unwrap();
    let report = restored
        .service
        .import_bundle(&bundle.file_blob, &bundle.passphrase)
        .await
        .unwrap();

    assert_eq!(report.imported_count, 4);
    assert_eq!(report.skipped_count, 0);

    for fingerprint in &own {
        let record = restored.service.get_key(fingerprint).await.unwrap();
        assert!(record.is_own_key, "own key lost its secret in transit");
    }
    let record = restored.service.get_key(&contact).await.unwrap();
    assert!(!record.is_own_key);

    // The restored secrets are usable in the new session.
    let ciphertext = restored
        .service
        .encrypt(b"hello again", &[own[0].clone()])
        .await
        .unwrap();
    let decrypted = restored.service.decrypt(&ciphertext, None).await.unwrap();
    assert_eq!(decrypted.plaintext, b"hello again");
}

#[tokio::test]
async fn reimport_into_same_keyring_is_all_skips() {
    let (ctx, ..) = seeded_context().await;

    let bundle = ctx.service.export_bundle(false).await.unwrap();
    let report = ctx
        .service
        .import_bundle(&bundle.file_blob, &bundle.passphrase)
        .await
        .unwrap();

    assert_eq!(report.imported_count, 0);
    assert_eq!(report.skipped_count, 4);
}

#[tokio::test]
async fn qr_reassembly_is_order_invariant() {
    let (ctx, ..) = seeded_context().await;
    let bundle = ctx.service.export_bundle(false).await.unwrap();
    assert!(bundle.qr_parts.len() > 1);

    let mut forward = PartCollector::new();
    for part in &bundle.qr_parts {
        forward.accept(part).unwrap();
    }

    let mut reverse = PartCollector::new();
    for part in bundle.qr_parts.iter().rev() {
        reverse.accept(part).unwrap();
    }

    let a = forward.assemble().unwrap();
    let b = reverse.assemble().unwrap();
    assert_eq!(a, b);
    assert_eq!(a, bundle.file_blob);
}

#[tokio::test]
async fn inconsistent_totals_abort_the_scan() {
    let mut collector = PartCollector::new();
    collector.accept("KCPGP:1/5:chunkdata").unwrap();
    let result = collector.accept("KCPGP:2/7:chunkdata");
    assert!(matches!(result, Err(Error::InconsistentBundle)));
}

#[tokio::test]
async fn wrong_passphrase_yields_bad_passphrase() {
    let (ctx, ..) = seeded_context().await;
    let bundle = ctx.service.export_bundle(false).await.unwrap();

    let restored = TestContext::new().await.unwrap();
    let result = restored
        .service
        .import_bundle(
            &bundle.file_blob,
            "0000-0000-0000-0000-0000-0000-0000-0000-0000",
        )
        .await;
    assert!(matches!(result, Err(Error::BadPassphrase)));

    // Nothing may have been imported.
    assert!(restored.service.list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn passphrase_part_is_opt_in() {
    let (ctx, ..) = seeded_context().await;

    let bundle = ctx.service.export_bundle(false).await.unwrap();
    assert!(bundle.qr_parts.iter().all(|p| p.starts_with("KCPGP:")));

    let demo = ctx.service.export_bundle(true).await.unwrap();
    assert!(demo.qr_parts[0].starts_with("KCPGP-PASS:"));
}
