#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;
use std::fs;

use proptest::prelude::*;

use bids_core::{ErrorCategory, ScratchWorkspace, extract_archives};

use common::{Fixture, write_tgz, write_zip};

#[test]
fn test_missing_archive_root_is_noop() {
    let fixture = Fixture::new();
    let workspace = ScratchWorkspace::create(&fixture.scratch_root()).unwrap();
    let summary = extract_archives(&fixture.archive_root(), &fixture.session, &workspace).unwrap();
    assert!(summary.acquisitions.is_empty());
    assert!(!workspace.dicom_root().exists());
}

#[test]
fn test_corrupt_archive_names_the_file() {
    let fixture = Fixture::new();
    fs::write(fixture.acquisition("anat").join("broken.tgz"), b"not gzip").unwrap();
    let workspace = ScratchWorkspace::create(&fixture.scratch_root()).unwrap();

    let err = extract_archives(&fixture.archive_root(), &fixture.session, &workspace).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ExternalTool);
    assert!(err.to_string().contains("broken.tgz"));
}

#[test]
fn test_loose_root_archives_are_ignored() {
    let fixture = Fixture::new();
    fixture.acquisition("anat");
    write_tgz(&fixture.archive_root().join("loose.tgz"), &[("IM0001.dcm", b"x")]);
    let workspace = ScratchWorkspace::create(&fixture.scratch_root()).unwrap();

    let summary = extract_archives(&fixture.archive_root(), &fixture.session, &workspace).unwrap();

    assert_eq!(summary.acquisitions, vec!["anat".to_string()]);
    assert_eq!(summary.archives_unpacked, 0);
    assert!(fixture.archive_root().join("loose.tgz").is_file());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_acquisition_is_staged(
        acquisitions in prop::collection::btree_set("(anat|func|dwi|fmap)_[a-z0-9]{1,6}", 1..4),
        loose_files in prop::collection::btree_set("[a-z]{1,8}\\.txt", 0..4),
        use_zip in any::<bool>(),
    ) {
        let fixture = Fixture::new();
        for name in &acquisitions {
            let dir = fixture.acquisition(name);
            let entries: [(&str, &[u8]); 2] = [("IM0001.dcm", b"a"), ("series/IM0002.dcm", b"b")];
            if use_zip {
                write_zip(&dir.join("images.zip"), &entries);
            } else {
                write_tgz(&dir.join("images.tar.gz"), &entries);
            }
            for file in &loose_files {
                fs::write(dir.join(file), file.as_bytes()).unwrap();
            }
        }
        let workspace = ScratchWorkspace::create(&fixture.scratch_root()).unwrap();

        let summary = extract_archives(&fixture.archive_root(), &fixture.session, &workspace).unwrap();

        let staged = workspace.staged_dicoms(&fixture.session);
        let staged_names: BTreeSet<String> = fs::read_dir(&staged)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        prop_assert_eq!(&staged_names, &acquisitions);
        prop_assert_eq!(summary.archives_unpacked, acquisitions.len());
        prop_assert_eq!(summary.files_copied, acquisitions.len() * loose_files.len());
        let archive_name = if use_zip { "images.zip" } else { "images.tar.gz" };
        for name in &acquisitions {
            let dir = staged.join(name);
            prop_assert!(dir.join("IM0001.dcm").is_file());
            prop_assert!(dir.join("series/IM0002.dcm").is_file());
            prop_assert!(!dir.join(archive_name).exists());
            prop_assert!(workspace.consumed_archives(&fixture.session).join(name).join(archive_name).is_file());
            for file in &loose_files {
                prop_assert_eq!(fs::read(dir.join(file)).unwrap(), file.as_bytes().to_vec());
            }
        }
    }
}
