use spectrod_core::DataSink;
use spectrod_core::sink::parse_record_line;

#[test]
fn append_then_read_last_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DataSink::new(dir.path());
    sink.append(0.01, -60.12, &[1, 2, 3]).unwrap();
    sink.append(0.25, -60.10, &[7, 65_535, 9]).unwrap();

    let rec = sink.read_last().unwrap();
    assert!((rec.exposure_secs - 0.25).abs() < 1e-12);
    assert!((rec.temperature_c - (-60.10)).abs() < 1e-9);
    assert_eq!(rec.samples, vec![7, 65_535, 9]);
}

#[test]
fn exposure_keeps_nanosecond_precision() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DataSink::new(dir.path());
    sink.append(0.123456789, 0.0, &[0]).unwrap();
    let last = sink.read_last().unwrap().to_string();
    assert!(last.contains(",0.123456789,"), "line was {last}");
}

#[test]
fn count_matches_appends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DataSink::new(dir.path());
    assert_eq!(sink.count_lines().unwrap(), 0, "missing file counts as zero");
    for i in 0..7 {
        sink.append(0.01, -59.0, &[i]).unwrap();
    }
    assert_eq!(sink.count_lines().unwrap(), 7);
}

#[test]
fn read_last_rejects_a_garbled_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DataSink::new(dir.path());
    std::fs::write(sink.today_path(), "2026-08-26T10:00:00,not-a-number,-60.0,1\n").unwrap();
    let err = sink.read_last().unwrap_err();
    assert!(format!("{err}").contains("malformed record"), "got {err}");
}

#[test]
fn read_last_without_a_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DataSink::new(dir.path());
    let err = sink.read_last().unwrap_err();
    assert!(format!("{err}").contains("no spectra"));
}

#[test]
fn file_name_carries_the_date() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DataSink::new(dir.path());
    sink.append(0.01, 0.0, &[1]).unwrap();
    let name = sink
        .today_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap();
    assert!(name.ends_with("_spectra.csv"), "name was {name}");
    assert!(sink.today_path().exists());
    // YYYY-MM-DD prefix
    let date = &name[..10];
    assert_eq!(date.len(), 10);
    assert_eq!(date.as_bytes()[4], b'-');
    assert_eq!(date.as_bytes()[7], b'-');
}

#[test]
fn concurrent_appends_never_interleave() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = std::sync::Arc::new(DataSink::new(dir.path()));
    let mut handles = Vec::new();
    for t in 0..4 {
        let sink = sink.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                sink.append(0.01, -60.0, &[t, i]).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(sink.count_lines().unwrap(), 100);
    // Every line must parse back cleanly.
    let text = std::fs::read_to_string(sink.today_path()).unwrap();
    for line in text.lines() {
        parse_record_line(line).unwrap();
    }
}
