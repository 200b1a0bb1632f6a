#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: book, pay and complete, leaving 180 available.
    let mut scenario1 = tempfile::NamedTempFile::new().unwrap();
    for line in [
        r#"{"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}"#,
        r#"{"op":"create_booking","label":"b1","gig":"clean","client":"bob"}"#,
        r#"{"op":"initiate_payment","booking":"b1"}"#,
        r#"{"op":"gateway_callback","booking":"b1","outcome":"success"}"#,
        r#"{"op":"transition","booking":"b1","actor":"alice","to":"in_progress"}"#,
        r#"{"op":"transition","booking":"b1","actor":"alice","to":"completed"}"#,
    ] {
        writeln!(scenario1, "{line}").unwrap();
    }

    let mut cmd1 = Command::new(cargo_bin!("gigpay"));
    cmd1.arg(scenario1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains(",180,0,180"));

    // 2. Second run: pay out 100 against the recovered wallet. Actor
    // ids are label-derived, so "alice" addresses the same wallet.
    let mut scenario2 = tempfile::NamedTempFile::new().unwrap();
    for line in [
        r#"{"op":"create_payout","label":"p1","provider":"alice","amount":100}"#,
        r#"{"op":"complete_payout","payout":"p1"}"#,
    ] {
        writeln!(scenario2, "{line}").unwrap();
    }

    let mut cmd2 = Command::new(cargo_bin!("gigpay"));
    cmd2.arg(scenario2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // 180 recovered minus the 100 payout.
    assert!(stdout2.contains(",80,0,180"));
}
