use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::core::config::Settings;
use crate::services::analysis::{FileAnalysisResult, FileError};

const FILE_ANALYSIS_SYSTEM_PROMPT: &str = r#"Eres un profesor experimentado de programación.
Tu tarea es revisar un archivo entregado por un estudiante y calificarlo sobre 5.0 puntos.

Criterios de evaluación:
1. Corrección y funcionamiento del código
2. Cumplimiento de la consigna de la actividad
3. Claridad y organización del código
4. Manejo de errores y casos límite
5. Buenas prácticas del lenguaje

Si la entrega incluye archivos analizados previamente, tenlos en cuenta: el archivo actual
puede usar funciones o estructuras definidas en ellos.

Formato de respuesta (JSON estricto, textos en español):
{
  "summary": "resumen breve de lo que hace el archivo",
  "strengths": ["punto fuerte 1", "punto fuerte 2"],
  "weaknesses": ["punto débil 1"],
  "errors": [
    {"line": <número de línea o null>, "message": "descripción del error"}
  ],
  "score": <número entre 0.0 y 5.0>
}
"#;

const FREEFORM_SYSTEM_PROMPT: &str = r#"Eres un profesor experimentado que evalúa entregas de estudiantes.
Recibirás la consigna de la actividad, el enlace entregado y la descripción escrita por el estudiante.
Evalúa la entrega de forma integral sobre 5.0 puntos.

Formato de respuesta (JSON estricto, textos en español):
{
  "grade": <número entre 0.0 y 5.0>,
  "feedback": "retroalimentación detallada para el estudiante"
}
"#;

#[derive(Debug, Clone)]
pub(crate) struct FileAnalysisRequest {
    pub(crate) path: String,
    pub(crate) content: String,
    pub(crate) activity_description: String,
    pub(crate) repo_url: String,
    pub(crate) caller_id: String,
    pub(crate) prior: Vec<FileAnalysisResult>,
}

#[derive(Debug, Clone)]
pub(crate) struct FreeformGradeRequest {
    pub(crate) description: String,
    pub(crate) url: String,
    pub(crate) activity_description: String,
    pub(crate) caller_id: String,
}

#[derive(Debug, Clone)]
pub(crate) struct FreeformAssessment {
    pub(crate) grade: f64,
    pub(crate) feedback: String,
}

#[async_trait]
pub(crate) trait InferenceService: Send + Sync {
    async fn analyze_file(&self, request: FileAnalysisRequest) -> Result<FileAnalysisResult>;
    async fn grade_freeform(&self, request: FreeformGradeRequest) -> Result<FreeformAssessment>;
}

#[derive(Debug, Deserialize)]
struct FileAnalysisPayload {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    errors: Vec<FileErrorPayload>,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct FileErrorPayload {
    #[serde(default)]
    line: Option<u32>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct FreeformPayload {
    grade: f64,
    #[serde(default)]
    feedback: String,
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiInferenceService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_file_chars: usize,
}

impl OpenAiInferenceService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            temperature: settings.ai().ai_temperature,
            max_file_chars: settings.ai().ai_max_file_chars,
        })
    }

    async fn chat_completion(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=3 {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow::anyhow!("OpenAI API error: {body}"));
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call OpenAI API"));
                }
            }

            if attempt < 3 {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt as u32))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        Ok(body)
    }
}

#[async_trait]
impl InferenceService for OpenAiInferenceService {
    async fn analyze_file(&self, request: FileAnalysisRequest) -> Result<FileAnalysisResult> {
        let timer = Instant::now();
        let user_prompt = build_file_analysis_prompt(&request, self.max_file_chars);

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": FILE_ANALYSIS_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        tracing::info!(path = %request.path, user_id = %request.caller_id, "Sending file analysis request");

        let body = self.chat_completion(&payload).await?;
        let parsed: FileAnalysisPayload = parse_message_content(&body)?;
        if !parsed.score.is_finite() {
            anyhow::bail!("AI returned a non-numeric file score");
        }

        tracing::info!(
            path = %request.path,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used(&body),
            "File analysis completed"
        );

        Ok(FileAnalysisResult {
            filename: request.path,
            repo_url: request.repo_url,
            summary: parsed.summary,
            strengths: parsed.strengths,
            weaknesses: parsed.weaknesses,
            errors: parsed
                .errors
                .into_iter()
                .map(|error| FileError { line: error.line, message: error.message })
                .collect(),
            score_contribution: parsed.score.clamp(0.0, 5.0),
            degraded: false,
        })
    }

    async fn grade_freeform(&self, request: FreeformGradeRequest) -> Result<FreeformAssessment> {
        let timer = Instant::now();
        let user_prompt = format!(
            "Consigna de la actividad:\n{}\n\nEnlace entregado: {}\n\nDescripción del estudiante:\n{}\n\nEvalúa la entrega de forma integral y responde únicamente con el JSON descrito en el prompt de sistema.",
            request.activity_description, request.url, request.description
        );

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": FREEFORM_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        tracing::info!(url = %request.url, user_id = %request.caller_id, "Sending freeform grading request");

        let body = self.chat_completion(&payload).await?;
        let parsed: FreeformPayload = parse_message_content(&body)?;
        if !parsed.grade.is_finite() {
            anyhow::bail!("AI returned a non-numeric grade");
        }

        tracing::info!(
            url = %request.url,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used(&body),
            "Freeform grading completed"
        );

        Ok(FreeformAssessment { grade: parsed.grade, feedback: parsed.feedback })
    }
}

fn build_file_analysis_prompt(request: &FileAnalysisRequest, max_file_chars: usize) -> String {
    let mut prompt = format!(
        "Consigna de la actividad:\n{}\n\nRepositorio: {}\n\nArchivo a evaluar: {}\n",
        request.activity_description, request.repo_url, request.path
    );

    let prior: Vec<&FileAnalysisResult> =
        request.prior.iter().filter(|analysis| !analysis.summary.is_empty()).collect();
    if !prior.is_empty() {
        prompt.push_str("\nArchivos ya analizados en esta entrega:\n");
        for analysis in prior {
            prompt.push_str(&format!("- {}: {}\n", analysis.filename, analysis.summary));
        }
    }

    prompt.push_str(&format!(
        "\nContenido del archivo:\n```\n{}\n```\n\nResponde únicamente con el JSON descrito en el prompt de sistema.",
        truncate_chars(&request.content, max_file_chars)
    ));
    prompt
}

fn truncate_chars(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars).collect();
    format!("{truncated}\n[contenido truncado]")
}

fn parse_message_content<T: DeserializeOwned>(body: &Value) -> Result<T> {
    let content = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|value| value.as_str())
        .context("Missing OpenAI response content")?;

    serde_json::from_str(content).context("Failed to parse AI JSON")
}

fn tokens_used(body: &Value) -> Option<u64> {
    body.get("usage").and_then(|usage| usage.get("total_tokens")).and_then(|value| value.as_u64())
}
