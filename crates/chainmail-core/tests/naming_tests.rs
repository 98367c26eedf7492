//! Name-service tests through the client facade.

use std::sync::Arc;

use chainmail_core::{
    CancellationToken, ClientConfig, CoreError, ErrorKind, MailClient, NameResolutionError,
    NetworkKey, StaticNameResolver,
};
use chainmail_protocol::{NameServiceStatus, Protocol};

fn client(resolver: Arc<StaticNameResolver>) -> MailClient {
    let key = NetworkKey::new(Protocol::Ethereum, "mainnet");
    MailClient::builder(ClientConfig::in_memory())
        .with_name_resolver(key.clone(), resolver.clone())
        .with_address_resolver(key, resolver)
        .build()
        .unwrap()
}

fn mainnet() -> NetworkKey {
    NetworkKey::new(Protocol::Ethereum, "mainnet")
}

#[tokio::test]
async fn test_nonexistent_domain_is_a_status() {
    let client = client(Arc::new(StaticNameResolver::new()));
    let resolution = client
        .resolve_name(&mainnet(), "nobody.eth", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resolution.address, "");
    assert_eq!(resolution.status, NameServiceStatus::NonExistentDomain);
    assert_eq!(resolution.status.code(), 3);
}

#[tokio::test]
async fn test_backend_error_is_internal() {
    let resolver = Arc::new(StaticNameResolver::new());
    resolver.fail_with("flaky.eth", NameResolutionError::Backend("timeout".into()));
    let client = client(resolver);

    let err = client
        .resolve_name(&mainnet(), "flaky.eth", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NameResolution(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_every_sentinel_maps_to_its_code() {
    let resolver = Arc::new(StaticNameResolver::new());
    let sentinels = [
        ("format.eth", NameResolutionError::FormatError, 1),
        ("servfail.eth", NameResolutionError::ServerFailure, 2),
        ("nx.eth", NameResolutionError::NonExistentDomain, 3),
        ("notimp.eth", NameResolutionError::NotImplemented, 4),
        ("refused.eth", NameResolutionError::Refused, 5),
    ];
    for (name, error, _) in &sentinels {
        resolver.fail_with(*name, error.clone());
    }
    let client = client(resolver);

    for (name, _, code) in &sentinels {
        let resolution = client
            .resolve_name(&mainnet(), name, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.status.code(), *code);
        assert_eq!(resolution.address, "");
    }
}

#[tokio::test]
async fn test_reverse_lookup() {
    let resolver = Arc::new(StaticNameResolver::new());
    let raw = vec![0x5a; 20];
    resolver.insert("vault.eth", raw.clone());
    resolver.fail_with(hex::encode([0x6b; 20]), NameResolutionError::Refused);
    let client = client(resolver);
    let cancel = CancellationToken::new();

    let found = client
        .resolve_address(&mainnet(), &format!("0x{}", hex::encode(&raw)), &cancel)
        .await
        .unwrap();
    assert_eq!(found.name, "vault.eth");
    assert!(found.status.is_ok());

    let refused = client
        .resolve_address(&mainnet(), &format!("0x{}", hex::encode([0x6b; 20])), &cancel)
        .await
        .unwrap();
    assert_eq!(refused.status, NameServiceStatus::Refused);
    assert_eq!(refused.name, "");
}
