use brainvision::doctest_utils::{reference_events, write_recording, RecordingSpec};
use brainvision::{read_raw, read_raw_brainvision, Event, ReadOptions, SaveOptions};

// 参考记录中的事件，(onset, duration, code)
const EXPECTED: [(usize, usize, u32); 10] = [
    (487, 1, 253),
    (497, 1, 255),
    (1770, 1, 254),
    (1780, 1, 255),
    (3253, 1, 254),
    (3263, 1, 255),
    (4936, 1, 253),
    (4946, 1, 255),
    (6620, 1, 254),
    (6630, 1, 255),
];

fn expected_events() -> Vec<Event> {
    EXPECTED.iter().copied().map(Event::from).collect()
}

#[test]
fn test_reference_events() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "test", &RecordingSpec::default()).unwrap();

    let raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    assert_eq!(raw.get_events(), expected_events());
}

#[test]
fn test_stim_channel_samples() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "stim", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let stim = raw.stim_index();
    let (data, _) = raw.get_channels_by_indices(&[stim]).unwrap();
    let nonzero: Vec<(usize, f64)> = data
        .row(0)
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v != 0.0)
        .map(|(i, &v)| (i, v))
        .collect();

    let expected: Vec<(usize, f64)> = EXPECTED.iter().map(|e| (e.0, e.2 as f64)).collect();
    assert_eq!(nonzero, expected);
}

#[test]
fn test_replace_with_subset_and_persist() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "subset", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default().preload(true)).unwrap();

    let subset: Vec<Event> = raw.get_events().into_iter().filter(|e| e.code == 255).collect();
    assert_eq!(subset.len(), 5);
    raw.set_events(&subset).unwrap();
    assert_eq!(raw.get_events(), subset);

    let path = dir.path().join("subset_raw.rsc");
    raw.save(&path, &SaveOptions::default()).unwrap();
    let loaded = read_raw(&path).unwrap();
    assert_eq!(loaded.get_events(), subset);
}

#[test]
fn test_boundary_events() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "bounds", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    let n = raw.n_samples();

    let events = vec![Event::new(0, 1, 1), Event::new(n - 1, 1, 2)];
    raw.set_events(&events).unwrap();
    assert_eq!(raw.get_events(), events);

    let path = dir.path().join("bounds_raw.rsc");
    raw.save(&path, &SaveOptions::default()).unwrap();
    assert_eq!(read_raw(&path).unwrap().get_events(), events);
}

#[test]
fn test_out_of_range_events_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "range", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    let n = raw.n_samples();

    let err = raw.set_events(&[Event::new(10, 1, 3), Event::new(n, 1, 4)]).unwrap_err();
    assert!(err.is_validation_error());
    // 失败时事件保持不变
    assert_eq!(raw.get_events(), expected_events());

    assert!(raw.set_events(&[Event::new(10, 1, 0)]).is_err());
}

#[test]
fn test_huge_durations_are_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "long", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    let n = raw.n_samples();

    raw.set_events(&[Event::new(5, usize::MAX, 3)]).unwrap();
    assert_eq!(raw.get_events(), vec![Event::new(5, n - 5, 3)]);
}

#[test]
fn test_huge_marker_size_is_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "longmarker", &RecordingSpec::default()).unwrap();
    let vmrk = dir.path().join("longmarker.vmrk");
    let text = std::fs::read_to_string(&vmrk)
        .unwrap()
        .replace("Stimulus,S253,488,1,0", "Stimulus,S253,488,18446744073709551615,0");
    std::fs::write(&vmrk, text).unwrap();

    let raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    // 第一个事件延续到数据末尾，其余事件都落在它上面
    assert_eq!(raw.get_events(), vec![Event::new(487, 10, 253)]);
}

#[test]
fn test_set_events_replaces_everything() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "replace", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    raw.set_events(&[]).unwrap();
    assert!(raw.get_events().is_empty());

    raw.set_events(&expected_events()).unwrap();
    let again = raw.get_events();
    raw.set_events(&again).unwrap();
    assert_eq!(raw.get_events(), expected_events());
}

#[test]
fn test_response_markers_and_durations() {
    let dir = tempfile::tempdir().unwrap();
    let spec = RecordingSpec {
        events: vec![
            Event::new(100, 1, 7),
            Event::new(200, 25, 3),
            // 响应标记 R  2
            Event::new(300, 1, 1002),
        ],
        ..RecordingSpec::default()
    };
    let vhdr = write_recording(dir.path(), "responses", &spec).unwrap();

    let raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    assert_eq!(raw.get_events(), spec.events);
}

#[test]
fn test_overlapping_events_take_the_larger_code() {
    let dir = tempfile::tempdir().unwrap();
    let spec = RecordingSpec {
        events: vec![Event::new(50, 10, 4), Event::new(55, 10, 9)],
        ..RecordingSpec::default()
    };
    let vhdr = write_recording(dir.path(), "overlap", &spec).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let stim = raw.stim_index();
    let (data, _) = raw.read_window(&[stim], 50, 66).unwrap();
    let values: Vec<f64> = data.row(0).to_vec();
    let mut expected = vec![4.0; 5];
    expected.extend(vec![9.0; 10]);
    expected.push(0.0);
    assert_eq!(values, expected);

    // 从 0 开始的上升沿只有一个，持续时间为第一个码的长度
    assert_eq!(raw.get_events(), vec![Event::new(50, 5, 4)]);
}

#[test]
fn test_fixture_events_match_reference() {
    assert_eq!(reference_events(), expected_events());
}
