use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn scenario_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn test_dispute_resolved_for_client_leaves_escrow_untouched() {
    let file = scenario_file(&[
        r#"{"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}"#,
        r#"{"op":"create_booking","label":"b1","gig":"clean","client":"bob"}"#,
        r#"{"op":"initiate_payment","booking":"b1"}"#,
        r#"{"op":"gateway_callback","booking":"b1","outcome":"success"}"#,
        r#"{"op":"transition","booking":"b1","actor":"alice","to":"in_progress"}"#,
        r#"{"op":"open_dispute","booking":"b1","actor":"bob","reason":"work not finished"}"#,
        r#"{"op":"resolve_dispute","booking":"b1","favor_of":"client","resolution":"refund the client"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("gigpay"));
    cmd.arg(file.path());

    // The refund settles manually later; escrow is not reconciled at
    // resolution time.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",0,180,0"));
}

#[test]
fn test_dispute_blocks_completion() {
    let file = scenario_file(&[
        r#"{"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}"#,
        r#"{"op":"create_booking","label":"b1","gig":"clean","client":"bob"}"#,
        r#"{"op":"initiate_payment","booking":"b1"}"#,
        r#"{"op":"gateway_callback","booking":"b1","outcome":"success"}"#,
        r#"{"op":"transition","booking":"b1","actor":"alice","to":"in_progress"}"#,
        r#"{"op":"open_dispute","booking":"b1","actor":"bob","reason":"no-show"}"#,
        r#"{"op":"transition","booking":"b1","actor":"alice","to":"completed"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("gigpay"));
    cmd.arg(file.path());

    // Completion is rejected while disputed, so nothing is released.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",0,180,0"))
        .stderr(predicate::str::contains("invalid state"));
}

#[test]
fn test_second_dispute_is_rejected() {
    let file = scenario_file(&[
        r#"{"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}"#,
        r#"{"op":"create_booking","label":"b1","gig":"clean","client":"bob"}"#,
        r#"{"op":"initiate_payment","booking":"b1"}"#,
        r#"{"op":"gateway_callback","booking":"b1","outcome":"success"}"#,
        r#"{"op":"transition","booking":"b1","actor":"alice","to":"in_progress"}"#,
        r#"{"op":"open_dispute","booking":"b1","actor":"bob","reason":"no-show"}"#,
        r#"{"op":"open_dispute","booking":"b1","actor":"alice","reason":"counter-claim"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("gigpay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("dispute already exists"));
}
