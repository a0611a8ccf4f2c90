use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use dssp_batch::domain::{ChainResult, PdbId, ResidueFeature};
use dssp_batch::error::PipelineError;
use dssp_batch::store::{CSV_HEADER, OutputStore, parse_id_list, read_id_list};

fn temp_store() -> (tempfile::TempDir, OutputStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("dssp")).unwrap();
    (temp, OutputStore::new(root))
}

fn row(resi: &str, sstr: &str, rasa: f64) -> ResidueFeature {
    ResidueFeature {
        resi: resi.to_string(),
        sstr: sstr.to_string(),
        rasa,
        phi: -60.0,
        psi: 145.12345,
    }
}

#[test]
fn writes_one_csv_per_chain() {
    let (_temp, store) = temp_store();
    let id: PdbId = "1crn".parse().unwrap();
    let results = vec![
        ChainResult {
            ordinal: 1,
            rows: vec![row("T", "E", 0.5), row("T", "-", 1.0)],
        },
        ChainResult {
            ordinal: 2,
            rows: vec![row("C", "H", 0.0)],
        },
    ];

    let paths = store.write(&id, &results).unwrap();

    assert_eq!(
        paths,
        vec![store.chain_path(&id, 1), store.chain_path(&id, 2)]
    );
    let first = fs::read_to_string(paths[0].as_std_path()).unwrap();
    assert_eq!(
        first,
        format!("{CSV_HEADER}\nT,E,0.5,-60.0,145.12345\nT,-,1.0,-60.0,145.12345\n")
    );
    let second = fs::read_to_string(paths[1].as_std_path()).unwrap();
    assert_eq!(second, format!("{CSV_HEADER}\nC,H,0.0,-60.0,145.12345\n"));

    let leftovers = fs::read_dir(store.root().as_std_path())
        .unwrap()
        .filter(|entry| {
            let name = entry.as_ref().unwrap().file_name();
            !name.to_string_lossy().ends_with(".csv")
        })
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn nothing_to_write_is_no_features() {
    let (_temp, store) = temp_store();
    let id: PdbId = "1crn".parse().unwrap();
    let empty = vec![ChainResult {
        ordinal: 1,
        rows: Vec::new(),
    }];

    assert_matches!(store.write(&id, &[]), Err(PipelineError::NoFeatures(_)));
    assert_matches!(store.write(&id, &empty), Err(PipelineError::NoFeatures(_)));
    assert!(store.completed_ids().unwrap().is_empty());
}

#[test]
fn completed_ids_reads_file_names() {
    let (_temp, store) = temp_store();
    store.ensure_root().unwrap();
    for name in ["1abc_1.csv", "1abc_2.csv", "2xyz_1.csv", "notes.txt", "3def.csv", "4GHI_1.csv"] {
        fs::write(store.root().join(name).as_std_path(), "").unwrap();
    }

    let completed = store.completed_ids().unwrap();

    assert_eq!(
        completed.into_iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        vec!["1abc", "2xyz"]
    );
}

#[test]
fn any_suffix_marks_identifier_completed() {
    let (_temp, store) = temp_store();
    store.ensure_root().unwrap();
    for name in ["5abc_x.csv", "6def_1_old.csv", "7ghi_.csv", "8jkl_1.csv.bak", "9mno-1.csv"] {
        fs::write(store.root().join(name).as_std_path(), "").unwrap();
    }

    let completed = store.completed_ids().unwrap();

    assert_eq!(
        completed.into_iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        vec!["5abc", "6def", "7ghi"]
    );
}

#[test]
fn missing_output_dir_means_nothing_completed() {
    let (_temp, store) = temp_store();
    assert!(store.completed_ids().unwrap().is_empty());
}

#[test]
fn id_list_skips_comments_and_blanks() {
    let ids = parse_id_list("# header\n1ABC\n\n  2xyz  \n").unwrap();
    assert_eq!(
        ids.iter().map(PdbId::as_str).collect::<Vec<_>>(),
        vec!["1abc", "2xyz"]
    );

    let err = parse_id_list("1abc\ntoolong\n").unwrap_err();
    assert_matches!(err, PipelineError::InvalidIdentifier(value) if value == "toolong");
}

#[test]
fn id_list_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("ids.txt")).unwrap();
    fs::write(path.as_std_path(), "9xyz\n").unwrap();

    let ids = read_id_list(&path).unwrap();
    assert_eq!(ids[0].as_str(), "9xyz");

    let missing = read_id_list(&path.with_file_name("missing.txt")).unwrap_err();
    assert_matches!(missing, PipelineError::Filesystem(_));
}
