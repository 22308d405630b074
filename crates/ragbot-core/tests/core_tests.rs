use std::fs;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use ragbot_core::config::{resolve_with_base, Config, Settings, SourceKind};
use ragbot_core::source::{load_documents, read_records, read_text_source};
use ragbot_core::chunker::{ChunkingConfig, TabularSchema};
use ragbot_core::traits::WhitespaceTokenCounter;
use ragbot_core::Error;
use tempfile::TempDir;

#[test]
fn default_settings_describe_three_domains() {
    let settings = Settings::default();
    settings.validate().expect("defaults are valid");
    assert_eq!(settings.domains.keys().map(String::as_str).collect::<Vec<_>>(), ["1", "2", "3"]);
    assert!(matches!(settings.domains["3"].kind, SourceKind::Tabular { .. }));
    assert_eq!(settings.retrieval.top_k, 5);
    assert_eq!(settings.retrieval.history_window, 3);
    assert_eq!(settings.chunking, ChunkingConfig { window: 700, overlap: 100, token_limit: 1000 });
}

#[test]
fn toml_overrides_merge_over_defaults() {
    let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(
        r#"
        [retrieval]
        top_k = 2

        [domains.4]
        label = "Extra"
        source = "extra.txt"
        index_dir = "idx/extra"
        kind = "text"
        "#,
    ));
    let settings = Config::from_figment(figment).settings().expect("settings");
    assert_eq!(settings.retrieval.top_k, 2);
    assert_eq!(settings.retrieval.history_window, 3);
    assert_eq!(settings.domains.len(), 4);
    assert_eq!(settings.domains["4"].kind, SourceKind::Text);
}

#[test]
fn load_from_directory_reads_config_toml() {
    let tmp = TempDir::new().expect("tmp");
    fs::write(tmp.path().join("config.toml"), "[chunking]\nwindow = 500\n").expect("write");
    let config = Config::load_from(tmp.path()).expect("load");
    assert_eq!(config.get::<usize>("chunking.window").expect("window"), 500);
    assert_eq!(config.settings().expect("settings").chunking.overlap, 100);
}

#[test]
fn invalid_chunking_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    fs::write(tmp.path().join("config.toml"), "[chunking]\nwindow = 50\noverlap = 80\n").expect("write");
    assert!(Config::load_from(tmp.path()).is_err());
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = std::path::Path::new("/srv/ragbot");
    assert_eq!(resolve_with_base(base, "data/index/uab"), base.join("data/index/uab"));
    assert_eq!(resolve_with_base(base, "/abs/path"), std::path::PathBuf::from("/abs/path"));
}

#[test]
fn records_are_read_from_json_array() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("ucs.json");
    fs::write(
        &path,
        r#"[{"Nome da Unidade Curricular": "Compiladores", "ECTS": 6, "Temas": "", "Código": null}]"#,
    )
    .expect("write");
    let records = read_records(&path).expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("ECTS").map(String::as_str), Some("6"));
    assert!(!records[0].contains_key("Temas"), "empty cells count as missing");
    assert!(!records[0].contains_key("Código"));

    fs::write(&path, r#"{"not": "an array"}"#).expect("write");
    assert!(matches!(read_records(&path), Err(Error::Source { .. })));
}

#[test]
fn text_source_directory_is_concatenated_in_order() {
    let tmp = TempDir::new().expect("tmp");
    fs::write(tmp.path().join("b.txt"), "segundo").expect("write");
    fs::write(tmp.path().join("a.txt"), "primeiro").expect("write");
    fs::write(tmp.path().join("notes.md"), "ignored").expect("write");
    assert_eq!(read_text_source(tmp.path()).expect("text"), "primeiro\n\nsegundo");
}

#[test]
fn load_documents_uses_domain_kind() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("uab.txt");
    fs::write(&path, "A UAB foi fundada em 1988.").expect("write");
    let docs = load_documents(&SourceKind::Text, &path, &ChunkingConfig::default(), &WhitespaceTokenCounter)
        .expect("docs");
    assert_eq!(docs.len(), 1);

    let missing = tmp.path().join("missing.txt");
    let err = load_documents(&SourceKind::Text, &missing, &ChunkingConfig::default(), &WhitespaceTokenCounter)
        .expect_err("missing source");
    assert!(matches!(err, Error::Source { .. }));
}

#[test]
fn tabular_sources_become_titled_course_units() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("ucs.json");
    fs::write(
        &path,
        r#"[
            {"Nome da Unidade Curricular": "Álgebra Linear", "ECTS": 6, "Temas": "matrizes e vetores"},
            {"Temas": "protocolos TCP", "Avaliação": null}
        ]"#,
    )
    .expect("write");
    let kind = SourceKind::Tabular { schema: TabularSchema::default() };
    let docs = load_documents(&kind, &path, &ChunkingConfig::default(), &WhitespaceTokenCounter).expect("docs");

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].metadata["unit_name"], "Álgebra Linear");
    assert!(docs[0].content.starts_with("Unidade Curricular: Álgebra Linear\n"));
    assert!(docs[0].content.contains("ECTS: 6\n"));
    assert!(docs[0].content.contains("Temas: matrizes e vetores\n"));
    assert_eq!(docs[1].metadata["unit_name"], "Unidade Curricular não identificada");
    assert!(docs[1].content.contains("Avaliação: Avaliação não encontrada\n"));
}
