use anyhow::Result;

use crate::services::analysis::FileAnalysisResult;
use crate::services::inference::{FreeformGradeRequest, InferenceService};

#[derive(Debug, Clone)]
pub(crate) struct GradeOutcome {
    pub(crate) grade: f64,
    pub(crate) feedback: String,
}

/// Folds per-file analyses and missing required files into one grade and one
/// feedback document. Missing files count as zero-score inputs, so they pull
/// the mean down instead of silently disappearing. The grade keeps one
/// decimal, truncated, and is clamped to [0.0, 5.0]. Feedback is never empty.
pub(crate) fn aggregate(
    analyses: &[FileAnalysisResult],
    description: &str,
    missing: &[String],
) -> GradeOutcome {
    let total_inputs = analyses.len() + missing.len();
    let grade = if total_inputs == 0 {
        0.0
    } else {
        let sum: f64 =
            analyses.iter().map(|analysis| analysis.score_contribution.clamp(0.0, 5.0)).sum();
        round_down_to_tenth(sum / total_inputs as f64).clamp(0.0, 5.0)
    };

    let feedback = render_feedback(analyses, description, missing, grade);
    GradeOutcome { grade, feedback }
}

/// Holistic grading for activities without discrete files (Colab links and
/// manual link submissions). A failure here is fatal to the attempt: there is
/// no per-file containment to fall back on.
pub(crate) async fn aggregate_single_shot(
    inference: &dyn InferenceService,
    description: &str,
    url: &str,
    activity_description: &str,
    caller_id: &str,
) -> Result<GradeOutcome> {
    let assessment = inference
        .grade_freeform(FreeformGradeRequest {
            description: description.to_string(),
            url: url.to_string(),
            activity_description: activity_description.to_string(),
            caller_id: caller_id.to_string(),
        })
        .await?;

    let grade = round_down_to_tenth(assessment.grade).clamp(0.0, 5.0);
    let feedback = if assessment.feedback.trim().is_empty() {
        "La entrega fue evaluada, pero no se generaron comentarios adicionales.".to_string()
    } else {
        assessment.feedback
    };

    Ok(GradeOutcome { grade, feedback })
}

fn round_down_to_tenth(value: f64) -> f64 {
    (value * 10.0).floor() / 10.0
}

fn render_feedback(
    analyses: &[FileAnalysisResult],
    description: &str,
    missing: &[String],
    grade: f64,
) -> String {
    let mut doc = String::from("# Evaluación automática\n");
    if let Some(line) = description.lines().find(|line| !line.trim().is_empty()) {
        doc.push_str(&format!("\n**Actividad:** {}\n", line.trim()));
    }

    if analyses.iter().all(|analysis| analysis.degraded) {
        doc.push_str(
            "\nNo fue posible completar el análisis automático de esta entrega. \
             Vuelve a intentarlo más tarde o contacta a tu profesor.\n",
        );
    }
    for analysis in analyses {
        render_analysis(&mut doc, analysis);
    }

    if !missing.is_empty() {
        doc.push_str("\n## Archivos no encontrados\n\n");
        for path in missing {
            doc.push_str(&format!("- {path}\n"));
        }
        doc.push_str(
            "\nEstos archivos requeridos no se encontraron en el repositorio y cuentan \
             como 0.0 en la calificación.\n",
        );
    }

    doc.push_str(&format!("\n---\n**Calificación final: {grade:.1}/5.0**\n"));
    doc
}

fn render_analysis(doc: &mut String, analysis: &FileAnalysisResult) {
    doc.push_str(&format!(
        "\n## {}: {:.1}/5.0\n",
        analysis.filename, analysis.score_contribution
    ));
    if analysis.degraded {
        doc.push_str("\nNo fue posible analizar este archivo.\n");
    } else if !analysis.summary.is_empty() {
        doc.push_str(&format!("\n{}\n", analysis.summary));
    }
    render_list(doc, "Puntos fuertes", &analysis.strengths);
    render_list(doc, "Puntos a mejorar", &analysis.weaknesses);
    if !analysis.errors.is_empty() {
        doc.push_str("\n**Errores detectados:**\n");
        for error in &analysis.errors {
            match error.line {
                Some(line) => doc.push_str(&format!("- Línea {line}: {}\n", error.message)),
                None => doc.push_str(&format!("- {}\n", error.message)),
            }
        }
    }
}

fn render_list(doc: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    doc.push_str(&format!("\n**{title}:**\n"));
    for item in items {
        doc.push_str(&format!("- {item}\n"));
    }
}
