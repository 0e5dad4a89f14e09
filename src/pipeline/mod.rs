/// Client-side pipelines: upload (scatter), download (reconstruct),
/// verify (availability probe).
pub mod download;
pub mod upload;
pub mod verify;

pub use download::{run_download, DownloadResult};
pub use upload::{run_upload, UploadResult};
pub use verify::{run_verify, VerifyReport};

#[cfg(test)]
mod tests {
    //! End-to-end pipeline tests against in-process storage nodes and a
    //! stub directory, all on ephemeral local listeners.
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, RwLock};

    use axum::extract::State;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::config::{ClientConfig, NodeConfig, UploadOptions};
    use crate::crypto::hash;
    use crate::error::{IntegrityStage, MystError};
    use crate::manifest::RecoveryManifest;
    use crate::net::transport::{FragmentMetadata, NodeClient, StoreRequest};
    use crate::net::NodeDescriptor;
    use crate::node::{build_app, NodeState};

    use super::*;

    #[derive(Clone)]
    struct StubDirectory {
        nodes: Arc<RwLock<Vec<NodeDescriptor>>>,
    }

    async fn list_nodes(State(stub): State<StubDirectory>) -> Json<Value> {
        let nodes = stub.nodes.read().unwrap().clone();
        Json(json!({ "nodes": nodes }))
    }

    async fn ok_json() -> Json<Value> {
        Json(json!({ "success": true }))
    }

    /// A local network: one stub directory plus `count` fragment services.
    struct TestNet {
        directory_url: String,
        node_states: HashMap<String, Arc<NodeState>>,
        node_tasks: HashMap<String, tokio::task::JoinHandle<()>>,
        client_config: ClientConfig,
        workdir: PathBuf,
    }

    impl TestNet {
        async fn start(count: usize) -> Self {
            let stub = StubDirectory {
                nodes: Arc::new(RwLock::new(Vec::new())),
            };
            let directory_app = Router::new()
                .route("/nodes", get(list_nodes))
                .route("/register", post(ok_json))
                .route("/heartbeat/{node_id}", post(ok_json))
                .route("/unregister/{node_id}", post(ok_json))
                .route("/fragment/register", post(ok_json))
                .route("/stats", get(ok_json))
                .with_state(stub.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let directory_url = format!("http://{}", listener.local_addr().unwrap());
            tokio::spawn(async move {
                axum::serve(listener, directory_app).await.unwrap();
            });

            let workdir = std::env::temp_dir().join(format!("myst-e2e-{}", Uuid::now_v7()));
            tokio::fs::create_dir_all(&workdir).await.unwrap();

            let mut net = Self {
                directory_url: directory_url.clone(),
                node_states: HashMap::new(),
                node_tasks: HashMap::new(),
                client_config: ClientConfig::with_directory(directory_url),
                workdir,
            };

            for i in 0..count {
                let descriptor = net.spawn_node(i, 64 * 1024 * 1024).await;
                stub.nodes.write().unwrap().push(descriptor);
            }
            net
        }

        async fn spawn_node(&mut self, index: usize, capacity: u64) -> NodeDescriptor {
            let storage_dir = self.workdir.join(format!("node-{index}"));
            tokio::fs::create_dir_all(&storage_dir).await.unwrap();
            let config = NodeConfig {
                storage_dir,
                directory_url: self.directory_url.clone(),
                capacity,
                ..NodeConfig::default()
            };
            let state = NodeState::init(config).await.unwrap();
            let app = build_app(state.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let task = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let node_id = state.identity.node_id.clone();
            self.node_states.insert(node_id.clone(), state);
            self.node_tasks.insert(node_id.clone(), task);

            NodeDescriptor {
                id: node_id,
                address: "127.0.0.1".to_string(),
                port,
                reliability: 1.0,
            }
        }

        async fn write_input(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.workdir.join(name);
            tokio::fs::write(&path, content).await.unwrap();
            path
        }

        /// Make one fragment unavailable (evicted from its node's table).
        async fn disable_fragment(&self, manifest: &RecoveryManifest, partition: usize) {
            let record = &manifest.partitions[partition];
            for frag in &record.fragments {
                let state = &self.node_states[&frag.node_id];
                let mut table = state.table.write().await;
                table.entries.remove(&frag.fragment_id);
            }
        }

        /// Hostile-node tamper: flip a stored byte and recompute the
        /// node-side checksum so the node serves the lie consistently.
        async fn tamper_fragment(&self, manifest: &RecoveryManifest, partition: usize) {
            let frag = &manifest.partitions[partition].fragments[0];
            let state = &self.node_states[&frag.node_id];
            let path = state.fragment_path(&frag.fragment_id);
            let mut data = tokio::fs::read(&path).await.unwrap();
            data[0] ^= 0xFF;
            tokio::fs::write(&path, &data).await.unwrap();

            let mut table = state.table.write().await;
            let entry = table.entries.get_mut(&frag.fragment_id).unwrap();
            entry.checksum = hash::sha256_hex(&data);
        }

        fn kill_node(&self, node_id: &str) {
            self.node_tasks[node_id].abort();
        }
    }

    fn no_frills(partitions: usize, redundancy: usize) -> UploadOptions {
        UploadOptions {
            partitions,
            redundancy,
            compression: false,
            reed_solomon: false,
            master_password: None,
        }
    }

    #[tokio::test]
    async fn test_tiny_roundtrip_no_rs_no_compression() {
        let net = TestNet::start(4).await;
        let input = net.write_input("hello.txt", b"hello world").await;

        let result = run_upload(&input, &no_frills(4, 1), &net.client_config)
            .await
            .unwrap();

        let manifest = &result.manifest;
        assert_eq!(
            manifest.file_hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        let sizes: Vec<u64> = manifest.partitions.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![3, 3, 3, 2]);
        assert!(manifest
            .partitions
            .iter()
            .all(|p| p.fragments.len() == 1));
        assert!(manifest.reed_solomon_config.is_none());

        let out = net.workdir.join("hello.out");
        run_download(
            &result.manifest_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_full_feature_roundtrip_unique_key_material() {
        // D=5, R=2, parity and compression on: 7 shards, 14 fragments.
        let net = TestNet::start(14).await;
        let content: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let input = net.write_input("data.bin", &content).await;

        let options = UploadOptions {
            partitions: 5,
            redundancy: 2,
            ..UploadOptions::default()
        };
        let result = run_upload(&input, &options, &net.client_config).await.unwrap();
        let manifest = &result.manifest;

        assert_eq!(manifest.partitions.len(), 7);
        assert_eq!(result.fragments_stored, 14);

        // Every fragment id and every (key, iv, salt) triple is unique.
        let mut ids = std::collections::HashSet::new();
        let mut material = std::collections::HashSet::new();
        for p in &manifest.partitions {
            for f in &p.fragments {
                assert!(ids.insert(f.fragment_id.clone()));
                assert!(material.insert((
                    f.encryption.key.clone(),
                    f.encryption.iv.clone(),
                    f.encryption.salt.clone()
                )));
            }
        }

        let out = net.workdir.join("data.out");
        run_download(
            &result.manifest_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_rs_recovers_lost_partition() {
        // 1 MiB of zeros, D=10, R=1, parity 4: one loss must not matter.
        let net = TestNet::start(14).await;
        let input = net.write_input("zeros.bin", &vec![0u8; 1 << 20]).await;

        let options = UploadOptions {
            partitions: 10,
            redundancy: 1,
            compression: true,
            reed_solomon: true,
            master_password: None,
        };
        let result = run_upload(&input, &options, &net.client_config).await.unwrap();
        assert_eq!(result.manifest.partitions.len(), 14);

        net.disable_fragment(&result.manifest, 3).await;

        let out = net.workdir.join("zeros.out");
        run_download(
            &result.manifest_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), vec![0u8; 1 << 20]);
    }

    #[tokio::test]
    async fn test_rs_exhaustion_reports_counts() {
        let net = TestNet::start(14).await;
        let input = net.write_input("zeros.bin", &vec![0u8; 64 * 1024]).await;

        let options = UploadOptions {
            partitions: 10,
            redundancy: 1,
            compression: true,
            reed_solomon: true,
            master_password: None,
        };
        let result = run_upload(&input, &options, &net.client_config).await.unwrap();

        // Five losses leave 9 shards; 10 are needed.
        for partition in [0, 2, 4, 6, 8] {
            net.disable_fragment(&result.manifest, partition).await;
        }

        let out = net.workdir.join("zeros.out");
        let err = run_download(
            &result.manifest_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap_err();

        match err {
            MystError::InsufficientShards { have, need } => {
                assert_eq!(have, 9);
                assert_eq!(need, 10);
            }
            other => panic!("expected InsufficientShards, got {other:?}"),
        }
        assert!(!tokio::fs::try_exists(&out).await.unwrap());
    }

    #[tokio::test]
    async fn test_password_binding() {
        let net = TestNet::start(10).await;
        let input = net.write_input("secret.txt", b"secret").await;

        let options = UploadOptions {
            partitions: 3,
            redundancy: 2,
            master_password: Some("correct horse".to_string()),
            ..UploadOptions::default()
        };
        let result = run_upload(&input, &options, &net.client_config).await.unwrap();

        let master = &result.manifest.security.master_encryption;
        assert!(master.password_protected);
        assert!(master.key.is_none());
        assert!(master.salt.is_some());
        assert_eq!(master.key_derivation, "PBKDF2");

        // No password at all.
        let err = run_download(&result.manifest_path, None, None, &net.client_config)
            .await
            .unwrap_err();
        assert!(matches!(err, MystError::PasswordRequired));

        // Wrong password.
        let err = run_download(
            &result.manifest_path,
            None,
            Some("wrong".to_string()),
            &net.client_config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MystError::IncorrectPassword));

        // Correct password.
        let out = net.workdir.join("secret.out");
        run_download(
            &result.manifest_path,
            Some(out.clone()),
            Some("correct horse".to_string()),
            &net.client_config,
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"secret");
    }

    #[tokio::test]
    async fn test_tampered_fragment_detected_before_output() {
        let net = TestNet::start(5).await;
        let input = net.write_input("plain.bin", &[42u8; 500]).await;

        let result = run_upload(&input, &no_frills(5, 1), &net.client_config)
            .await
            .unwrap();
        net.tamper_fragment(&result.manifest, 2).await;

        let out = net.workdir.join("plain.out");
        let err = run_download(
            &result.manifest_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap_err();

        match err {
            MystError::IntegrityFailure { stage } => {
                assert_eq!(stage, IntegrityStage::FragmentCiphertext)
            }
            other => panic!("expected IntegrityFailure, got {other:?}"),
        }
        assert!(!tokio::fs::try_exists(&out).await.unwrap());
    }

    #[tokio::test]
    async fn test_layer2_aead_is_the_backstop() {
        // Even with a forged manifest checksum covering the tampered
        // ciphertext, GCM refuses to decrypt it.
        let net = TestNet::start(5).await;
        let input = net.write_input("plain.bin", &[7u8; 500]).await;

        let result = run_upload(&input, &no_frills(5, 1), &net.client_config)
            .await
            .unwrap();
        net.tamper_fragment(&result.manifest, 2).await;

        let mut manifest = result.manifest.clone();
        let frag = &mut manifest.partitions[2].fragments[0];
        let state = &net.node_states[&frag.node_id];
        let tampered = tokio::fs::read(state.fragment_path(&frag.fragment_id))
            .await
            .unwrap();
        frag.checksum = hash::sha256_hex(&tampered);
        let forged_path = net.workdir.join("forged.myst");
        tokio::fs::write(&forged_path, manifest.to_json().unwrap())
            .await
            .unwrap();

        let err = run_download(&forged_path, None, None, &net.client_config)
            .await
            .unwrap_err();
        assert!(matches!(err, MystError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_tampered_manifest_file_hash_fails_final_check() {
        let net = TestNet::start(4).await;
        let input = net.write_input("doc.txt", b"authentic content").await;

        let result = run_upload(&input, &no_frills(4, 1), &net.client_config)
            .await
            .unwrap();

        let mut manifest = result.manifest.clone();
        manifest.file_hash = hash::sha256_hex(b"some other content");
        let tampered_path = net.workdir.join("tampered.myst");
        tokio::fs::write(&tampered_path, manifest.to_json().unwrap())
            .await
            .unwrap();

        let out = net.workdir.join("doc.out");
        let err = run_download(
            &tampered_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap_err();

        match err {
            MystError::IntegrityFailure { stage } => {
                assert_eq!(stage, IntegrityStage::FinalHash)
            }
            other => panic!("expected IntegrityFailure, got {other:?}"),
        }
        assert!(!tokio::fs::try_exists(&out).await.unwrap());
    }

    #[tokio::test]
    async fn test_insufficient_nodes() {
        let net = TestNet::start(2).await;
        let input = net.write_input("big.txt", &[1u8; 100]).await;

        let err = run_upload(&input, &no_frills(4, 1), &net.client_config)
            .await
            .unwrap_err();
        match err {
            MystError::InsufficientNodes { needed, available } => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientNodes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replica_failover_to_second_copy() {
        let net = TestNet::start(8).await;
        let input = net.write_input("dup.bin", &[9u8; 1000]).await;

        let result = run_upload(&input, &no_frills(4, 2), &net.client_config)
            .await
            .unwrap();

        // Remove every partition's first replica; the second must carry.
        for record in &result.manifest.partitions {
            let first = &record.fragments[0];
            let state = &net.node_states[&first.node_id];
            let mut table = state.table.write().await;
            table.entries.remove(&first.fragment_id);
        }

        let out = net.workdir.join("dup.out");
        run_download(
            &result.manifest_path,
            Some(out.clone()),
            None,
            &net.client_config,
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), [9u8; 1000]);
    }

    #[tokio::test]
    async fn test_verify_availability_report() {
        let net = TestNet::start(4).await;
        let input = net.write_input("avail.txt", &[5u8; 64]).await;

        let result = run_upload(&input, &no_frills(4, 1), &net.client_config)
            .await
            .unwrap();

        let report = run_verify(&result.manifest_path, &net.client_config)
            .await
            .unwrap();
        assert!(report.recoverable);
        assert_eq!(report.recoverable_partitions, 4);

        // Kill the node holding partition 0; without parity the file is
        // no longer recoverable.
        let dead = &result.manifest.partitions[0].fragments[0].node_id;
        net.kill_node(dead);
        let report = run_verify(&result.manifest_path, &net.client_config)
            .await
            .unwrap();
        assert!(!report.recoverable);
    }

    #[tokio::test]
    async fn test_node_rejects_bad_checksum_and_overflow() {
        let mut net = TestNet::start(0).await;
        let descriptor = net.spawn_node(0, 64).await; // 64-byte capacity
        let client = NodeClient::new(&net.client_config);
        let base = descriptor.base_url();

        let metadata = FragmentMetadata {
            file_hash: "f".repeat(64),
            partition_index: 0,
            redundancy_index: 0,
            double_encrypted: true,
            timestamp: 1,
        };

        // Oversized payload: HTTP 507.
        let big = StoreRequest::from_ciphertext("f-big".to_string(), &[0u8; 128], metadata.clone());
        let err = client.store(&base, &big).await.unwrap_err();
        assert!(err.to_string().contains("507"));

        // Wrong checksum: HTTP 400.
        let mut bad = StoreRequest::from_ciphertext("f-bad".to_string(), &[1u8; 16], metadata.clone());
        bad.checksum = "0".repeat(64);
        let err = client.store(&base, &bad).await.unwrap_err();
        assert!(err.to_string().contains("400"));

        // Honest store round-trips through /retrieve.
        let good = StoreRequest::from_ciphertext("f-good".to_string(), &[2u8; 16], metadata);
        client.store(&base, &good).await.unwrap();
        let served = client.retrieve(&base, "f-good").await.unwrap();
        assert_eq!(served, [2u8; 16]);

        // Unknown id: soft 404.
        let err = client.retrieve(&base, "missing").await.unwrap_err();
        assert!(matches!(err, MystError::FragmentNotFound { .. }));
    }
}
