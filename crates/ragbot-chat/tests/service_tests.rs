mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{registry, settings, text_domain, CountingEmbedder, ScriptedGenerator};
use ragbot_chat::{ChatRequest, ChatResponse, ChatService, ConversationHistory};
use ragbot_core::config::Settings;
use ragbot_core::error::Error;
use ragbot_core::types::Role;

const UAB: &str = "A UAB foi fundada em 1988.";

fn service(settings: &Settings, generator: Arc<ScriptedGenerator>) -> ChatService {
    ChatService::new(settings, registry(settings, Arc::new(CountingEmbedder::default())), generator)
}

#[tokio::test]
async fn answer_extends_history_and_grounds_the_prompt() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    let generator = Arc::new(ScriptedGenerator::answering("Em 1988."));
    let service = service(&settings, generator.clone());

    let (answer, history) = service.answer("1", "  Quando foi fundada a UAB?  ", ConversationHistory::new()).await?;
    assert_eq!(answer, "Em 1988.");
    assert_eq!(history.len(), 1);
    assert_eq!(history.turns()[0].question, "Quando foi fundada a UAB?");

    let sent = generator.last_messages();
    assert!(sent.iter().any(|m| m.role == Role::System && m.content == format!("Contexto: {UAB}")));
    assert_eq!(sent.last().map(|m| m.content.as_str()), Some("Quando foi fundada a UAB?"));
    Ok(())
}

#[tokio::test]
async fn empty_context_returns_fallback_without_generating() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", "   ")]);
    let generator = Arc::new(ScriptedGenerator::answering("nunca"));
    let service = service(&settings, generator.clone());
    let history = ConversationHistory::new().append("antes", "resposta");

    let (answer, after) = service.answer("1", "Quando?", history.clone()).await?;
    assert_eq!(answer, "Contexto relevante não encontrado.");
    assert_eq!(after, history);
    assert_eq!(generator.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn generation_failure_leaves_history_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    let service = service(&settings, Arc::new(ScriptedGenerator::failing()));
    let history = ConversationHistory::new().append("antes", "resposta");

    let request = ChatRequest { question: "Quando?".into(), domain_id: "1".into(), history: history.clone() };
    let err = service.answer(request.domain_id.as_str(), &request.question, request.history.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));

    match service.handle(request).await {
        ChatResponse::Error { error } => assert!(error.starts_with("Não foi possível obter uma resposta")),
        other => panic!("expected an error response, got {other:?}"),
    }
    assert!(!tmp.path().join("historico/history.txt").exists());
}

#[tokio::test]
async fn slow_generation_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let mut settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    settings.generation.timeout_secs = Some(1);
    let service = service(&settings, Arc::new(ScriptedGenerator::slow("tarde", Duration::from_secs(30))));

    let err = service.answer("1", "Quando?", ConversationHistory::new()).await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    let generator = Arc::new(ScriptedGenerator::answering("x"));
    let service = service(&settings, generator.clone());

    let err = service.answer("1", "   ", ConversationHistory::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn unknown_domain_maps_to_context_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    let service = service(&settings, Arc::new(ScriptedGenerator::answering("x")));

    let request = ChatRequest { question: "Olá".into(), domain_id: "9".into(), history: ConversationHistory::new() };
    match service.handle(request).await {
        ChatResponse::Error { error } => {
            assert!(error.starts_with("Contexto não encontrado."));
            assert!(error.contains("'9'"));
        }
        other => panic!("expected an error response, got {other:?}"),
    }
}

#[tokio::test]
async fn answered_turns_are_written_to_the_history_log() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    let service = service(&settings, Arc::new(ScriptedGenerator::answering("Em 1988.")));

    service.answer("1", "Quando foi fundada a UAB?", ConversationHistory::new()).await?;
    let log = std::fs::read_to_string(tmp.path().join("historico/history.txt"))?;
    assert!(log.contains("Pergunta: Quando foi fundada a UAB?\nResposta: Em 1988.\n"));
    assert!(log.trim_end().ends_with(&"-".repeat(50)));
    Ok(())
}

#[tokio::test]
async fn unwritable_history_log_does_not_fail_the_request() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    std::fs::create_dir_all(tmp.path().join("log-is-a-dir"))?;
    settings.history.log_path = "log-is-a-dir".to_string();
    let service = service(&settings, Arc::new(ScriptedGenerator::answering("Em 1988.")));

    let (answer, history) = service.answer("1", "Quando?", ConversationHistory::new()).await?;
    assert_eq!(answer, "Em 1988.");
    assert_eq!(history.len(), 1);
    Ok(())
}

#[tokio::test]
async fn responses_serialize_for_a_front_end() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path(), vec![text_domain(tmp.path(), "1", UAB)]);
    let service = service(&settings, Arc::new(ScriptedGenerator::answering("Em 1988.")));

    let request: ChatRequest = serde_json::from_str(r#"{"question":"Quando?","domain_id":"1"}"#)?;
    assert_eq!(request.domain_id.as_str(), "1");
    assert_eq!(serde_json::to_value(&request.domain_id)?, serde_json::json!("1"));
    let json = serde_json::to_value(service.handle(request).await)?;
    assert_eq!(
        json,
        serde_json::json!({ "answer": "Em 1988.", "history": [{ "question": "Quando?", "answer": "Em 1988." }] })
    );
    Ok(())
}
