fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::PathBuf;

    use chunklift_protocol::{
        CheckFileRequest, CheckFileResponse, MergeChunksRequest, Progress, UploadPhase,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (key-order independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_check_file_request() {
        let req: CheckFileRequest = roundtrip_test("check_file_request.json");
        assert_eq!(req.file_hash.len(), 64);
    }

    #[test]
    fn fixture_check_file_response() {
        let resp: CheckFileResponse = roundtrip_test("check_file_response.json");
        assert!(!resp.exist);
        assert_eq!(resp.uploaded_indexes, vec![0, 1, 4]);
    }

    #[test]
    fn fixture_check_file_response_without_indexes() {
        // Stores that already hold the whole file may omit the index list.
        let resp: CheckFileResponse =
            serde_json::from_value(load_fixture("check_file_response_exists.json")).unwrap();
        assert!(resp.exist);
        assert!(resp.uploaded_indexes.is_empty());
    }

    #[test]
    fn fixture_merge_chunks_request() {
        let req: MergeChunksRequest = roundtrip_test("merge_chunks_request.json");
        assert_eq!(req.file_name, "holiday-video.mp4");
    }

    #[test]
    fn fixture_progress() {
        let progress: Progress = roundtrip_test("progress.json");
        assert_eq!(
            progress,
            Progress::from_confirmed(BTreeSet::from([0, 1, 3]), 5)
        );
    }

    #[test]
    fn fixture_upload_phases() {
        let phases: Vec<UploadPhase> = roundtrip_test("upload_phases.json");
        assert_eq!(phases.len(), 10);
        assert_eq!(phases[0], UploadPhase::Idle);
        let terminal: Vec<_> = phases.iter().filter(|p| p.is_terminal()).collect();
        assert_eq!(
            terminal,
            [&UploadPhase::Done, &UploadPhase::Cancelled, &UploadPhase::Failed]
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let resp: CheckFileResponse = serde_json::from_str(
            r#"{"exist":false,"uploadedIndexes":[2],"message":"partial"}"#,
        )
        .unwrap();
        assert_eq!(resp.uploaded_indexes, vec![2]);
    }
}
