use super::*;

fn args(workers: usize, keys: &[&str], rounds: usize) -> KeysArgs {
    KeysArgs {
        workers,
        keys: keys.iter().map(|k| k.to_string()).collect(),
        rounds,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_acquisition_is_counted_and_map_is_pruned() {
    let report = run(args(6, &["a", "b", "c"], 30)).await.unwrap();

    let total: usize = report.keys.iter().map(|c| c.acquisitions).sum();
    assert_eq!(total, 6 * 30);
    assert!(report.keys.iter().all(|c| c.max_holders == 1));
    assert_eq!(report.remaining_entries, 0);
}

#[tokio::test]
async fn duplicate_and_blank_keys_are_ignored() {
    let report = run(args(2, &["a", "", "a", "b"], 4)).await.unwrap();

    let names: Vec<&str> = report.keys.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn no_keys_is_an_error() {
    let err = run(args(2, &[" "], 1)).await.unwrap_err();
    assert!(err.to_string().contains("at least one key"));
}

#[test]
fn report_renders_text() {
    let report = KeysReport {
        workers: 2,
        rounds: 3,
        keys: vec![KeyCount {
            key: "alpha".to_string(),
            acquisitions: 6,
            max_holders: 1,
        }],
        remaining_entries: 0,
    };

    let text = report.to_string();

    assert!(text.contains("Workers: 2 x 3 rounds"));
    assert!(text.contains("alpha: 6 acquisitions, max 1 holder(s)"));
    assert!(text.contains("Remaining entries: 0"));
}
