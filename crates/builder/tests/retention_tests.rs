mod common;

use common::*;
use std::fs;

const NOW: i64 = 1_700_000_000;

fn make_request_dir(tree: &TestTree, name: &str) {
    let dir = tree.temp_root().join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("firmware.bin"), b"image").unwrap();
}

#[tokio::test]
async fn test_sweep_removes_only_expired_requests() {
    let tree = TestTree::new();
    let max_age = tree.config.retention.max_age_secs as i64;

    make_request_dir(&tree, &format!("build_{}_0000000a", NOW - max_age - 1));
    make_request_dir(&tree, &format!("build_{}_0000000b", NOW - max_age));
    make_request_dir(&tree, &format!("build_{}_0000000c", NOW - 10));
    // Legacy names without a suffix are still aged.
    make_request_dir(&tree, &format!("build_{}", NOW - 2 * max_age));
    make_request_dir(&tree, "build_unknown");
    make_request_dir(&tree, "unrelated");

    let stats = tree.sweeper().sweep_at(NOW).await;
    assert_eq!(stats.builds_before, 5);
    assert_eq!(stats.builds_removed, 2);
    assert_eq!(stats.builds_after, 3);
    assert_eq!(stats.errors, 0);

    let root = tree.temp_root();
    assert!(!root.join(format!("build_{}_0000000a", NOW - max_age - 1)).exists());
    assert!(root.join(format!("build_{}_0000000b", NOW - max_age)).exists());
    assert!(root.join(format!("build_{}_0000000c", NOW - 10)).exists());
    assert!(root.join("build_unknown").exists());
    assert!(root.join("unrelated").exists());
    assert_eq!(tree.sweeper().count_builds().await, 3);
}

#[tokio::test]
async fn test_sweep_handles_missing_temp_root() {
    let tree = TestTree::new();
    fs::remove_dir_all(tree.temp_root()).unwrap();

    let stats = tree.sweeper().sweep_at(NOW).await;
    assert_eq!(stats.builds_before, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_rescan_scrubs_tree_leftovers() {
    let tree = TestTree::with_scratch();
    for path in tree.tree.staging_paths() {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{\"USERPREFS_CHANNEL_0_PSK\": \"{ 0x01 }\"}").unwrap();
    }
    let out = tree.tree.variant_output_dir("rak4631");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("firmware.uf2"), b"image").unwrap();
    fs::write(out.join("main.o"), b"object").unwrap();

    let scratch_root = &tree.config.build.scratch_roots[0];
    fs::create_dir_all(scratch_root.join("pio_build_tbeam_1700000000/tbeam")).unwrap();
    fs::create_dir_all(scratch_root.join("other")).unwrap();

    let stats = tree.sweeper().sweep_at(NOW).await;
    assert!(stats.tree_rescanned);
    assert_eq!(stats.tree_files_removed, tree.tree.staging_paths().len() + 1);
    assert_eq!(stats.scratch_dirs_removed, 1);

    assert!(tree.no_staged_configs());
    assert!(!out.join("firmware.uf2").exists());
    assert!(out.join("main.o").exists(), "object files are cache, not secrets");
    assert!(scratch_root.join("other").exists());
}

#[tokio::test]
async fn test_rescan_skipped_while_build_holds_tree() {
    let tree = TestTree::new();
    let path = tree.tree.staging_paths()[0].clone();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"{}").unwrap();

    let lease = tree.locks.acquire_variant("tbeam").await;
    let stats = tree.sweeper().sweep_at(NOW).await;
    assert!(!stats.tree_rescanned);
    assert!(path.exists(), "in-flight build's staged config must survive");
    drop(lease);

    let stats = tree.sweeper().sweep_at(NOW).await;
    assert!(stats.tree_rescanned);
    assert!(!path.exists());
}
