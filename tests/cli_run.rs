use std::fmt::Write as _;
use std::fs;
use std::process::Command;

use chrono::{Duration, NaiveDate};
use tempfile::tempdir;

fn ilicast() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ilicast"))
}

/// Two regions over two seasons, one row per region-week, with a single `flu` predictor.
fn combined_table() -> String {
    let start = NaiveDate::from_ymd_opt(2019, 8, 4).unwrap();
    let mut text = String::from("region,week_start,wili,flu\n");
    for region in 1..=2u32 {
        let flu = |i: usize| ((i * 37 + region as usize * 11) % 23) as f64 + 1.0;
        for i in 0..100 {
            let wili = if i == 0 { 1.0 } else { 0.5 * flu(i - 1) + ((i * 7) % 5) as f64 * 0.1 };
            let week = start + Duration::weeks(i as i64);
            writeln!(text, "hhs{region},{week},{wili},{}", flu(i)).unwrap();
        }
    }
    text
}

#[test]
fn run_writes_the_backtest_tables() {
    let tmp = tempdir().expect("temporary directory");
    let combined = tmp.path().join("combined.csv");
    fs::write(&combined, combined_table()).expect("write combined table");
    let config = tmp.path().join("ilicast.toml");
    fs::write(&config, "target = \"wili\"\npredictors = [\"flu\"]\nlags = [1, 2]\n")
        .expect("write config");
    let out_dir = tmp.path().join("out");

    let output = ilicast()
        .args(["run", combined.to_str().expect("path str")])
        .args(["--config", config.to_str().expect("path str")])
        .args(["--out-dir", out_dir.to_str().expect("path str")])
        .output()
        .expect("run ilicast cli");

    assert!(
        output.status.success(),
        "CLI exited with status {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    for name in ["predictions.tsv", "coefficients.tsv", "models.tsv"] {
        assert!(out_dir.join(name).exists(), "{name} missing");
    }
    assert!(!out_dir.join("skipped.tsv").exists());

    let coefficients = fs::read_to_string(out_dir.join("coefficients.tsv")).expect("read");
    let header = coefficients.lines().next().expect("header");
    assert_eq!(header, "season_cutoff\tlag_rule\tfeature\tlag\tcoef\tLag Window");
    // One cutoff (2020), rules {lag2} and {lag1, lag2}: three coefficients in total.
    assert_eq!(coefficients.lines().count(), 1 + 3);
    assert!(coefficients.lines().skip(1).all(|line| line.starts_with("2020\t")));
}

#[test]
fn json_format_writes_a_single_response_body() {
    let tmp = tempdir().expect("temporary directory");
    let combined = tmp.path().join("combined.csv");
    fs::write(&combined, combined_table()).expect("write combined table");
    let config = tmp.path().join("ilicast.toml");
    fs::write(&config, "predictors = [\"flu\"]\nlags = [2, 1]\n").expect("write config");

    let status = ilicast()
        .current_dir(tmp.path())
        .args(["run", "combined.csv", "--config", "ilicast.toml"])
        .args(["--format", "json", "--sequential"])
        .status()
        .expect("run ilicast cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let body: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("preds.json")).expect("read"))
            .expect("valid json");
    let predictions = body["predictions"].as_array().expect("predictions array");
    assert!(!predictions.is_empty());
    assert_eq!(predictions[0]["season_cutoff"], 2020);
    assert!(!tmp.path().join("predictions.tsv").exists());
}

#[test]
fn config_prints_the_defaults_as_toml() {
    let output = ilicast().arg("config").output().expect("run ilicast cli");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("target = \"wili\""));
    assert!(stdout.contains("\"sore_throat\""));
    assert!(stdout.contains("parallel = true"));
}

#[test]
fn combine_joins_fluview_and_trends_exports() {
    let tmp = tempdir().expect("temporary directory");
    fs::write(
        tmp.path().join("fluview.csv"),
        "region,epiweek,wili\nhhs1,202001,2.5\nhhs1,202002,3.0\nhhs2,202001,4.0\n",
    )
    .expect("write fluview");
    fs::write(
        tmp.path().join("trends.csv"),
        "date,state,flu\n2019-12-29,CT,40\n2019-12-29,ME,44\n2020-01-05,CT,38\n2019-12-29,TX,10\n",
    )
    .expect("write trends");
    fs::write(tmp.path().join("ilicast.toml"), "predictors = [\"flu\"]\n").expect("write config");

    let status = ilicast()
        .current_dir(tmp.path())
        .args(["combine", "--fluview", "fluview.csv", "--trends", "trends.csv"])
        .args(["--out", "combined.csv", "--config", "ilicast.toml"])
        .status()
        .expect("run ilicast cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let combined = fs::read_to_string(tmp.path().join("combined.csv")).expect("read");
    let lines: Vec<&str> = combined.lines().collect();
    // TX belongs to region 6, which has no surveillance rows.
    assert_eq!(
        lines,
        vec![
            "region,state,week_start,wili,flu",
            "1,CT,2019-12-29,2.5,40",
            "1,ME,2019-12-29,2.5,44",
            "1,CT,2020-01-05,3,38",
        ]
    );
}

#[test]
fn failures_exit_nonzero_with_an_error_message() {
    let tmp = tempdir().expect("temporary directory");
    let output = ilicast()
        .current_dir(tmp.path())
        .args(["run", "missing.csv"])
        .output()
        .expect("run ilicast cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "stderr was: {stderr}");
}
