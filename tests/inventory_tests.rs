#[cfg(test)]
mod tests {
    use prescription_validator::config::ValidationConfig;
    use prescription_validator::fuzzy::MatchingStrategy;
    use prescription_validator::inventory::{
        Inventory, InventoryError, InventoryIndex, Lookup, MedicineLookup,
    };
    use prescription_validator::normalizer::normalize;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const LARGE_INVENTORY: [&str; 12] = [
        "Paracetamol 500mg",
        "Amoxicillin 250mg",
        "Ibuprofen 400mg",
        "Metformin 850mg",
        "Atorvastatin 20mg",
        "Omeprazole 20mg",
        "Salbutamol inhaler",
        "Levothyroxine 50mcg",
        "Lisinopril 10mg",
        "Cetirizine 10mg",
        "Prednisolone 5mg",
        "Warfarin 1mg",
    ];

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn originals(index: &InventoryIndex) -> Vec<&str> {
        index.entries().iter().map(|e| e.original.as_str()).collect()
    }

    #[test]
    fn test_load_every_layout() {
        let dir = TempDir::new().unwrap();
        let config = ValidationConfig::default();
        let cases = [
            ("list.json", r#"["Aspirin", " Ibuprofen ", null, ""]"#),
            ("wrapped.json", r#"{"medicines": ["Aspirin", "Ibuprofen"]}"#),
            ("mapping.json", r#"{"a": "Aspirin", "b": "Ibuprofen", "count": 2}"#),
            ("stock.csv", "Aspirin,100,shelf A\n\"Ibuprofen\",20,shelf B\n"),
            ("stock.tsv", "Aspirin\t100\nIbuprofen\t20\n"),
            ("stock.txt", "\u{feff}Aspirin\n\n  Ibuprofen  \n"),
        ];

        for (name, content) in cases {
            let path = write_file(&dir, name, content);
            let index = InventoryIndex::load(&path, &config)
                .unwrap_or_else(|e| panic!("{} failed to load: {}", name, e));
            assert_eq!(originals(&index), vec!["Aspirin", "Ibuprofen"], "file {}", name);
        }
    }

    #[test]
    fn test_names_are_normalized_once_at_load() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "stock.txt", "Amoxicillin 250mg Caps\n");
        let index = InventoryIndex::load(&path, &ValidationConfig::default()).unwrap();

        let entry = &index.entries()[0];
        assert_eq!(entry.original, "Amoxicillin 250mg Caps");
        assert_eq!(entry.canonical, normalize("Amoxicillin 250mg Caps"));
        assert_eq!(entry.canonical, "amoxicillin capsule");
    }

    #[test]
    fn test_load_failures_degrade_to_absent() {
        let dir = TempDir::new().unwrap();

        let corrupt = write_file(&dir, "broken.json", "{\"medicines\": [\"Aspirin\"");
        assert!(matches!(
            InventoryIndex::load(&corrupt, &ValidationConfig::default()),
            Err(InventoryError::Format { .. })
        ));

        for path in [corrupt, dir.path().join("missing.json")] {
            let config = ValidationConfig {
                database_path: Some(path),
                ..ValidationConfig::default()
            };
            let inventory = Inventory::load_or_absent(&config);
            assert!(!inventory.is_loaded());
        }

        assert!(!Inventory::load_or_absent(&ValidationConfig::default()).is_loaded());
    }

    #[test]
    fn test_empty_file_loads_as_empty_index() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.txt", "\n\n");
        let config = ValidationConfig {
            database_path: Some(path),
            ..ValidationConfig::default()
        };

        match Inventory::load_or_absent(&config) {
            Inventory::Loaded(lookup) => {
                assert!(lookup.is_empty());
                assert_eq!(
                    lookup.best_match("Aspirin").unwrap(),
                    Lookup::NotFound { best_score: 0.0 }
                );
            }
            other => panic!("expected a loaded inventory, got {:?}", other),
        }
    }

    #[test]
    fn test_large_inventory_matches_typo() {
        let index = InventoryIndex::from_names(LARGE_INVENTORY, &ValidationConfig::default());

        match index.best_match("paracetmol").unwrap() {
            Lookup::Found { original, score } => {
                assert_eq!(original, "Paracetamol 500mg");
                assert!(score >= 0.75);
            }
            other => panic!("expected a match, got {:?}", other),
        }

        match index.best_match("Unrelatedxyzdrug").unwrap() {
            Lookup::NotFound { best_score } => assert!(best_score < 0.75),
            other => panic!("expected no match, got {:?}", other),
        }
    }

    #[test]
    fn test_strategies_agree_on_clear_matches() {
        for strategy in [MatchingStrategy::FullEnsemble, MatchingStrategy::SequenceOnly] {
            let config = ValidationConfig {
                strategy,
                ..ValidationConfig::default()
            };
            let index = InventoryIndex::from_names(LARGE_INVENTORY, &config);
            for (query, expected) in [
                ("ATORVASTATIN 20 MG", "Atorvastatin 20mg"),
                ("warfarin", "Warfarin 1mg"),
                ("omeprazol", "Omeprazole 20mg"),
            ] {
                match index.best_match(query).unwrap() {
                    Lookup::Found { original, .. } => {
                        assert_eq!(original, expected, "{:?} with {:?}", query, strategy)
                    }
                    other => panic!("{:?} with {:?}: {:?}", query, strategy, other),
                }
            }
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let base = ValidationConfig::default();
        let probe = InventoryIndex::from_names(["Amoxicillin 250mg"], &base);
        let exact = probe.scorer().score(&normalize("amoxicilin"), "amoxicillin");

        let config = ValidationConfig {
            match_threshold: exact,
            ..base
        };
        let index = InventoryIndex::from_names(["Amoxicillin 250mg"], &config);
        assert_eq!(
            index.best_match("amoxicilin").unwrap(),
            Lookup::Found {
                original: "Amoxicillin 250mg".to_string(),
                score: exact
            }
        );

        let stricter = ValidationConfig {
            match_threshold: (exact + 1e-9).min(1.0),
            ..ValidationConfig::default()
        };
        let index = InventoryIndex::from_names(["Amoxicillin 250mg"], &stricter);
        assert!(matches!(
            index.best_match("amoxicilin").unwrap(),
            Lookup::NotFound { .. }
        ));
    }
}
