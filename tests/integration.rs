use std::{env, fs, path::Path, path::PathBuf, process::Command};

fn run_bin(dir: &Path, args: &[&str]) -> String {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_adstats"));

    let output = Command::new(bin)
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );

    stdout_str.to_owned()
}

fn test_dir(name: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    test_dir
}

fn parse_report(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).expect("failed to parse json report")
}

const ADS_CSV: &str = "\
page_id,ad_id,estimated_spend,estimated_impressions,currency,platform,bylines,ad_creation_time
101,1,5,1000,USD,facebook,Friends of A,2024-03-02
101,2,7,,USD,\"facebook,instagram\",Friends of A,2024-01-15
202,3,12.5,300,USD,instagram,,2024-05-30
303,4,,50,EUR,facebook,Committee B,2024-02-01
202,5,oops,20,,facebook,Committee B
";

#[test]
fn basic_workflow() {
    let test_dir = test_dir("basic_workflow");
    fs::write(
        test_dir.join("2024_fb_ads_president_scored_anon.csv"),
        ADS_CSV,
    )
    .expect("failed to write dataset");

    // No arguments: default input file, every backend, text report.
    let stdout = run_bin(&test_dir, &[]);
    for section in [
        "BACKEND: streaming",
        "BACKEND: table",
        "BACKEND: columnar",
        "Analysis After Aggregation by page_id",
        "Analysis After Aggregation by (page_id, ad_id)",
        "Total Preservation Check:",
        "- Total estimated spend: $24.50",
        "- Date range: 2024-01-15 to 2024-05-30",
        "Consistency check: all backends agree",
    ] {
        assert!(stdout.contains(section), "missing {section:?} in:\n{stdout}");
    }

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn backends_agree_in_json() {
    let test_dir = test_dir("backends_agree_in_json");
    let input = test_dir.join("ads.csv");
    fs::write(&input, ADS_CSV).expect("failed to write dataset");
    let input_str = input.to_str().expect("failed to convert input path to string");

    let report = parse_report(&run_bin(
        &test_dir,
        &["--input", input_str, "--format", "json"],
    ));

    let analyses = report["analyses"].as_array().expect("analyses array");
    assert_eq!(analyses.len(), 3);
    assert_eq!(report["comparison"]["mismatches"], serde_json::json!([]));

    for analysis in analyses {
        let original = &analysis["original"];
        assert_eq!(original["rows"], 5);
        assert_eq!(original["columns"].as_array().map(Vec::len), Some(8));

        // Literal empty or missing cells: 1 impression, 1 currency, 1 byline,
        // 1 spend and 1 creation time.
        let null_total: u64 = original["columns"]
            .as_array()
            .expect("columns array")
            .iter()
            .map(|col| col["null"].as_u64().expect("null count"))
            .sum();
        assert_eq!(null_total, 5);

        let aggregations = analysis["aggregations"].as_array().expect("aggregations");
        assert_eq!(aggregations[0]["summary"]["rows"], 3);
        assert_eq!(aggregations[1]["summary"]["rows"], 5);

        let spend = analysis["totals"]
            .as_array()
            .expect("totals array")
            .iter()
            .find(|totals| totals["column"] == "estimated_spend")
            .expect("spend totals");
        assert_eq!(spend["original"], 24.5);
        assert_eq!(spend["aggregated"], serde_json::json!([24.5, 24.5]));
    }

    for analysis in &analyses[1..] {
        assert_eq!(analysis["original"], analyses[0]["original"]);
        assert_eq!(analysis["aggregations"], analyses[0]["aggregations"]);
    }

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn single_numeric_column_summary() {
    let test_dir = test_dir("single_numeric_column_summary");
    let input = test_dir.join("spend.csv");
    fs::write(&input, "spend\n10\n20\n\"\"\n").expect("failed to write dataset");
    let input_str = input.to_str().expect("failed to convert input path to string");

    for backend in ["streaming", "table", "columnar"] {
        let report = parse_report(&run_bin(
            &test_dir,
            &["--input", input_str, "--backend", backend, "--format", "json"],
        ));
        let analyses = report["analyses"].as_array().expect("analyses array");
        assert_eq!(analyses.len(), 1);
        assert!(report["comparison"].is_null());

        let col = &analyses[0]["original"]["columns"][0];
        assert_eq!(col["count"], 3);
        assert_eq!(col["null"], 1);
        assert_eq!(col["numeric"]["numeric_count"], 2);
        assert_eq!(col["numeric"]["mean"], 15.0);
        assert_eq!(col["numeric"]["sum"], 30.0);
    }

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn advertiser_spends_are_grouped() {
    let test_dir = test_dir("advertiser_spends_are_grouped");
    let input = test_dir.join("ads.csv");
    fs::write(&input, "page_id,ad_id,estimated_spend\n7,1,5\n7,2,7\n").expect("failed to write dataset");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "input = \"ads.csv\"\n"
        + "group_by = [ [ \"page_id\",], [ \"page_id\", \"ad_id\",],]\n"
        + "top_values = 3\n"
        + "categorical_top = 2\n";
    fs::write(&config_path, config_contents).expect("failed to write config file");
    let config_str = config_path
        .to_str()
        .expect("failed to convert config path to string");

    let report = parse_report(&run_bin(
        &test_dir,
        &["--config", config_str, "--format", "json"],
    ));

    for analysis in report["analyses"].as_array().expect("analyses array") {
        let by_page = &analysis["aggregations"][0]["summary"];
        assert_eq!(by_page["rows"], 1);
        let spend = &by_page["columns"][2];
        assert_eq!(spend["name"], "estimated_spend");
        assert_eq!(spend["numeric"]["sum"], 12.0);

        let by_ad = &analysis["aggregations"][1]["summary"];
        assert_eq!(by_ad["rows"], 2);
    }

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn missing_input_fails() {
    let test_dir = test_dir("missing_input_fails");
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_adstats"));

    let output = Command::new(bin)
        .current_dir(&test_dir)
        .args(["--input", "does-not-exist.csv"])
        .output()
        .expect("failed to execute command");
    assert!(!output.status.success());

    let output = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_adstats")))
        .current_dir(&test_dir)
        .env("RUST_LOG", "off")
        .args(["--config", "missing.toml"])
        .output()
        .expect("failed to execute command");
    assert_eq!(output.status.code(), Some(1));

    fs::remove_dir_all(&test_dir).ok();
}
