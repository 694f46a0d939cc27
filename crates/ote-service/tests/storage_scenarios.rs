//! End-to-end: storage service → in-process channel → tlkd → files on disk

use std::path::PathBuf;

use ote_core::{CallerIdentity, ObjectId, OteError};
use ote_crypto::DeviceUniqueId;
use ote_host::{host_channel, ChannelHost};
use ote_service::{
    AccessFlags, FixedDeviceId, Operation, StorageObject, StorageService, BLOB_OVERHEAD,
};
use tempfile::TempDir;
use tlkd::{Daemon, HostFileStore};

const DEMO_NAME: &str = "TADemo.blob";
const DEMO_DATA: &[u8] = b"Hello, Hello, from secure storage demo app.";

struct Harness {
    service: StorageService<ChannelHost>,
    root: PathBuf,
    _dir: TempDir,
}

fn harness_with_device(device: [u8; 16]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = HostFileStore::new(dir.path());
    let root = store.root().to_path_buf();
    let (host, source) = host_channel(8);
    tokio::spawn(Daemon::new(source, store).run());

    let provider = FixedDeviceId::new(DeviceUniqueId::from_bytes(device));
    Harness {
        service: StorageService::create(&provider, host).unwrap(),
        root,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with_device([0x3C; 16])
}

fn app_a() -> CallerIdentity {
    "1b4e28ba-2fa1-11d2-883f-0016d3cca427".parse().unwrap()
}

fn app_b() -> CallerIdentity {
    "9f0c7a1e-5d2b-4c3a-8e1f-2a3b4c5d6e7f".parse().unwrap()
}

fn object(name: &str) -> ObjectId {
    ObjectId::parse(name).unwrap()
}

#[tokio::test]
async fn test_demo_write_then_read() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let mut op = Operation::write(&object(DEMO_NAME), DEMO_DATA);
    h.service.receive_operation(&session, &mut op).await.unwrap();
    assert_eq!(op.value(2).unwrap() as usize, DEMO_DATA.len());

    let stored = std::fs::read(h.root.join(DEMO_NAME)).unwrap();
    assert_eq!(stored.len(), DEMO_DATA.len() + BLOB_OVERHEAD);
    assert!(!stored
        .windows(DEMO_NAME.len())
        .any(|w| w == DEMO_NAME.as_bytes()));

    let mut op = Operation::read(&object(DEMO_NAME), 256);
    h.service.receive_operation(&session, &mut op).await.unwrap();
    assert_eq!(op.value(2).unwrap() as usize, DEMO_DATA.len());
    assert_eq!(op.memref(1).unwrap(), DEMO_DATA);

    let mut op = Operation::size(&object(DEMO_NAME));
    h.service.receive_operation(&session, &mut op).await.unwrap();
    assert_eq!(op.value(1).unwrap() as usize, DEMO_DATA.len());

    h.service.close_session(session);
    h.service.destroy();
}

#[tokio::test]
async fn test_read_unwritten_object_is_not_found() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let mut op = Operation::read(&object("never-written"), 64);
    let err = h
        .service
        .receive_operation(&session, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::ItemNotFound(_)));
    assert_eq!(op.value(2).unwrap(), 0);
}

#[tokio::test]
async fn test_delete_then_read_is_not_found() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let mut op = Operation::write(&object(DEMO_NAME), DEMO_DATA);
    h.service.receive_operation(&session, &mut op).await.unwrap();

    let mut op = Operation::delete(&object(DEMO_NAME));
    h.service.receive_operation(&session, &mut op).await.unwrap();
    assert!(!h.root.join(DEMO_NAME).exists());

    let mut op = Operation::read(&object(DEMO_NAME), 256);
    let err = h
        .service
        .receive_operation(&session, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::ItemNotFound(_)));
}

#[tokio::test]
async fn test_renamed_blob_is_rejected() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let mut op = Operation::write(&object("a"), b"bound to the name a");
    h.service.receive_operation(&session, &mut op).await.unwrap();
    std::fs::copy(h.root.join("a"), h.root.join("b")).unwrap();

    let mut op = Operation::read(&object("b"), 256);
    let err = h
        .service
        .receive_operation(&session, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::AccessDenied));
}

#[tokio::test]
async fn test_other_caller_cannot_read() {
    let h = harness();
    let owner = h.service.open_session(Some(app_a()));
    let other = h.service.open_session(Some(app_b()));

    let mut op = Operation::write(&object("secret"), b"for app a only");
    h.service.receive_operation(&owner, &mut op).await.unwrap();

    let mut op = Operation::read(&object("secret"), 256);
    let err = h
        .service
        .receive_operation(&other, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::AccessDenied));
}

#[tokio::test]
async fn test_blob_from_other_device_is_rejected() {
    let first = harness_with_device([0x01; 16]);
    let second = harness_with_device([0x02; 16]);
    let s1 = first.service.open_session(Some(app_a()));
    let s2 = second.service.open_session(Some(app_a()));

    let mut op = Operation::write(&object("moved"), b"device bound");
    first.service.receive_operation(&s1, &mut op).await.unwrap();
    std::fs::create_dir_all(&second.root).unwrap();
    std::fs::copy(first.root.join("moved"), second.root.join("moved")).unwrap();

    let mut op = Operation::read(&object("moved"), 256);
    let err = second
        .service
        .receive_operation(&s2, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::AccessDenied));
}

#[tokio::test]
async fn test_tampered_blob_is_rejected() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let mut op = Operation::write(&object("t"), DEMO_DATA);
    h.service.receive_operation(&session, &mut op).await.unwrap();

    let path = h.root.join("t");
    let mut blob = std::fs::read(&path).unwrap();
    blob[70] ^= 0x01;
    std::fs::write(&path, &blob).unwrap();

    let mut op = Operation::read(&object("t"), 256);
    let err = h
        .service
        .receive_operation(&session, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::AccessDenied));
}

#[tokio::test]
async fn test_truncated_blob_is_rejected() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));
    std::fs::create_dir_all(&h.root).unwrap();
    std::fs::write(h.root.join("short"), [0u8; BLOB_OVERHEAD - 1]).unwrap();

    let mut op = Operation::read(&object("short"), 256);
    let err = h
        .service
        .receive_operation(&session, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::AccessDenied));

    let mut op = Operation::size(&object("short"));
    let err = h
        .service
        .receive_operation(&session, &mut op)
        .await
        .unwrap_err();
    assert!(matches!(err, OteError::AccessDenied));
}

#[tokio::test]
async fn test_empty_object_roundtrip() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let mut op = Operation::write(&object("empty"), b"");
    h.service.receive_operation(&session, &mut op).await.unwrap();

    let mut op = Operation::read(&object("empty"), 0);
    h.service.receive_operation(&session, &mut op).await.unwrap();
    assert_eq!(op.value(2).unwrap(), 0);
    assert!(op.memref(1).unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_object_api() {
    let h = harness();
    let session = h.service.open_session(Some(app_a()));

    let obj = StorageObject::open(
        &h.service,
        &session,
        DEMO_NAME,
        AccessFlags::READ | AccessFlags::WRITE,
    )
    .unwrap();
    obj.write(DEMO_DATA).await.unwrap();
    assert_eq!(obj.size().await.unwrap() as usize, DEMO_DATA.len());

    let mut buf = [0u8; 128];
    let n = obj.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], DEMO_DATA);

    // Opened without WRITE_META.
    let err = obj.delete().await.unwrap_err();
    assert!(matches!(err, OteError::BadParameters(_)));

    let obj = StorageObject::open(&h.service, &session, DEMO_NAME, AccessFlags::WRITE_META)
        .unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(
        obj.read(&mut buf).await,
        Err(OteError::BadParameters(_))
    ));
    obj.delete().await.unwrap();
    assert!(!h.root.join(DEMO_NAME).exists());
}
