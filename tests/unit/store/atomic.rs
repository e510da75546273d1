use super::*;

#[test]
fn temp_path_is_a_sibling() {
    let p = Path::new("/a/b/0001.jpg");
    assert_eq!(temp_path(p), PathBuf::from("/a/b/0001.jpg.tmp"));
}

#[test]
fn write_atomic_creates_parents_and_leaves_no_temp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("2024-03-01").join("0001.jpg");
    write_atomic(&path, b"abc").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"abc");
    assert!(!temp_path(&path).exists());

    write_atomic(&path, b"xyz").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"xyz");
}

#[test]
fn read_json_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let got: Option<Vec<u32>> = read_json(&dir.path().join("nope.json")).unwrap();
    assert!(got.is_none());
}

#[test]
fn json_round_trip_and_corrupt_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v.json");
    write_json_atomic(&path, &vec![1u32, 2, 3]).unwrap();
    let got: Option<Vec<u32>> = read_json(&path).unwrap();
    assert_eq!(got, Some(vec![1, 2, 3]));

    fs::write(&path, b"{ not json").unwrap();
    let err = read_json::<Vec<u32>>(&path).unwrap_err();
    assert!(matches!(err, LapseError::Serde(_)));
}

#[test]
fn write_into_a_file_path_parent_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"x").unwrap();
    let err = write_atomic(&blocker.join("child.json"), b"{}").unwrap_err();
    assert!(matches!(err, LapseError::Persistence(_)));
}
