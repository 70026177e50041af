use brainvision::doctest_utils::{write_recording, RecordingSpec};
use brainvision::{
    read_raw, read_raw_brainvision, BufferSize, RawReader, ReadOptions, SaveOptions,
};
use std::fs;
use std::io::{Seek, SeekFrom, Write};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_buffer_size_does_not_change_the_file() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "test", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let sizes = [
        BufferSize::Seconds(10.0),
        BufferSize::Seconds(2.0),
        BufferSize::Seconds(0.333),
        BufferSize::Samples(1),
        BufferSize::Samples(999),
        BufferSize::Whole,
    ];

    let mut outputs = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        let path = dir.path().join(format!("buffer_{}.rsc", i));
        raw.save(&path, &SaveOptions::default().buffer_size(*size)).unwrap();
        outputs.push(fs::read(&path).unwrap());
    }

    for (i, bytes) in outputs.iter().enumerate().skip(1) {
        assert!(bytes == &outputs[0], "buffer size {:?} changed the file", sizes[i]);
    }

    let reference = read_raw(dir.path().join("buffer_0.rsc")).unwrap().data().unwrap();
    assert_eq!(reference, raw.data().unwrap());
}

#[test]
fn test_lazy_and_preloaded_save_identically() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "modes", &RecordingSpec::default()).unwrap();

    let lazy_path = dir.path().join("lazy.rsc");
    let mut lazy = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
    lazy.save(&lazy_path, &SaveOptions::default()).unwrap();

    let eager_path = dir.path().join("eager.rsc");
    let mut eager = read_raw_brainvision(&vhdr, &ReadOptions::default().preload(true)).unwrap();
    eager.save(&eager_path, &SaveOptions::default().buffer_size(BufferSize::Seconds(3.0))).unwrap();

    assert!(fs::read(&lazy_path).unwrap() == fs::read(&eager_path).unwrap());
}

#[test]
fn test_save_after_load_data() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "load", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let before = dir.path().join("before.rsc");
    raw.save(&before, &SaveOptions::default()).unwrap();
    raw.load_data().unwrap();
    let after = dir.path().join("after.rsc");
    raw.save(&after, &SaveOptions::default()).unwrap();

    assert!(fs::read(&before).unwrap() == fs::read(&after).unwrap());
}

#[test]
fn test_overwrite_protection() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "overwrite", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let path = dir.path().join("once.rsc");
    raw.save(&path, &SaveOptions::default()).unwrap();
    let first = fs::read(&path).unwrap();

    let err = raw.save(&path, &SaveOptions::default()).unwrap_err();
    assert!(err.is_validation_error());
    assert!(fs::read(&path).unwrap() == first);

    raw.set_events(&[]).unwrap();
    raw.save(&path, &SaveOptions::default().overwrite(true)).unwrap();
    assert!(read_raw(&path).unwrap().get_events().is_empty());
}

#[test]
fn test_invalid_buffer_size_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "badbuf", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let path = dir.path().join("never.rsc");
    for size in [BufferSize::Samples(0), BufferSize::Seconds(0.0), BufferSize::Seconds(-2.0)] {
        let err = raw.save(&path, &SaveOptions::default().buffer_size(size)).unwrap_err();
        assert!(err.is_validation_error());
    }
    assert!(!path.exists());
}

#[test]
fn test_partial_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "partial", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let path = dir.path().join("partial.rsc");
    raw.save(&path, &SaveOptions::default()).unwrap();

    // 模拟中断的写入：状态字段回到 PARTIAL
    let mut file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(8)).unwrap();
    file.write_all(b"PARTIAL ").unwrap();
    drop(file);

    let err = read_raw(&path).unwrap_err();
    assert!(err.is_format_error(), "{}", err);
    assert!(RawReader::open(&path).is_err());
}

#[test]
fn test_windowed_container_reads() {
    let dir = tempfile::tempdir().unwrap();
    let vhdr = write_recording(dir.path(), "windows", &RecordingSpec::default()).unwrap();
    let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

    let path = dir.path().join("windows.rsc");
    raw.save(&path, &SaveOptions::default().buffer_size(BufferSize::Samples(1234))).unwrap();

    let mut reader = RawReader::open(&path).unwrap();
    let picks: Vec<usize> = (0..raw.n_channels()).collect();
    for (start, stop) in [(0, 1), (1233, 1235), (480, 500), (6999, 7000), (0, 7000)] {
        let (expected, _) = raw.read_window(&picks, start, stop).unwrap();
        assert_eq!(reader.read_window(start, stop).unwrap(), expected);
    }
    assert!(reader.read_window(6990, 7001).is_err());
}
