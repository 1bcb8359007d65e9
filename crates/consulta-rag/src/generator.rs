//! Answer generation: per-intent prompt templates, validation, confidence,
//! and follow-up suggestions.

use std::sync::Arc;

use tracing::debug;

use consulta_core::defaults::{ANSWER_MAX_CHARS, CONTEXT_MAX_CHARS};
use consulta_core::{
    truncate_chars, ChatBackend, ChatMessage, CompletionParams, Intent, QueryPlan, RankedContext,
    Result,
};

/// Answer returned when no usable context exists.
pub const FALLBACK_ANSWER: &str =
    "No hay información suficiente en los registros almacenados para responder esta consulta.";

/// Disclaimer appended to answers that mention medical terms.
const MEDICAL_DISCLAIMER: &str = "\n\n⚠️ Esta información proviene de conversaciones registradas. \
     Para decisiones médicas, consulte siempre con un profesional de la salud.";

const SYSTEM_PROMPT: &str =
    "Eres un asistente médico especializado en consultar información de expedientes médicos.";

/// Confidence assigned to fallback answers.
const FALLBACK_CONFIDENCE: f32 = 0.1;

/// How many top contexts feed the prompt.
const PROMPT_CONTEXT_COUNT: usize = 5;

/// Generation outcome before source assembly.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub confidence: f32,
    pub follow_ups: Vec<String>,
}

/// RAG answer generator.
pub struct Generator {
    chat: Arc<dyn ChatBackend>,
}

impl Generator {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self { chat }
    }

    /// Produce a validated answer from ranked contexts.
    pub async fn generate(
        &self,
        plan: &QueryPlan,
        contexts: &[RankedContext],
    ) -> Result<GeneratedAnswer> {
        if contexts.is_empty() {
            return Ok(GeneratedAnswer {
                answer: FALLBACK_ANSWER.to_string(),
                confidence: FALLBACK_CONFIDENCE,
                follow_ups: follow_up_suggestions(plan),
            });
        }

        let context_block = build_context_block(contexts);
        let prompt = prompt_for(plan.intent, &plan.raw_query, &context_block, plan);

        let raw_answer = self
            .chat
            .complete(
                &[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(&prompt)],
                &CompletionParams::default(),
            )
            .await?;

        let answer = validate_answer(&raw_answer);
        let confidence = compute_confidence(plan, contexts, &answer);

        debug!(
            intent = %plan.intent,
            answer_len = answer.len(),
            confidence,
            "Answer generated"
        );

        Ok(GeneratedAnswer {
            answer,
            confidence,
            follow_ups: follow_up_suggestions(plan),
        })
    }
}

/// Assemble the context block handed to the model, capped at 4 000 chars.
pub fn build_context_block(contexts: &[RankedContext]) -> String {
    let mut parts = Vec::new();
    for (i, context) in contexts.iter().take(PROMPT_CONTEXT_COUNT).enumerate() {
        let patient = context
            .patient_name
            .as_deref()
            .unwrap_or("Paciente no identificado");
        let date = context.date.as_deref().unwrap_or("Fecha no disponible");
        let content = truncate_chars(&context.payload_text, 500);
        parts.push(format!(
            "CONVERSACIÓN {}:\nPaciente: {}\nFecha: {}\nRelevancia: {:.2}\nContenido: {}\n",
            i + 1,
            patient,
            date,
            context.final_score,
            content
        ));
    }
    truncate_chars(&parts.join("\n"), CONTEXT_MAX_CHARS)
}

/// Per-intent prompt template. Every template carries the strict
/// only-from-context instruction.
fn prompt_for(intent: Intent, query: &str, context: &str, plan: &QueryPlan) -> String {
    match intent {
        Intent::PatientInfo => format!(
            "Basándote ÚNICAMENTE en la información médica proporcionada, responde la consulta \
             sobre un paciente específico.\n\n\
             INFORMACIÓN MÉDICA DISPONIBLE:\n{context}\n\n\
             CONSULTA: {query}\n\n\
             INSTRUCCIONES CRÍTICAS:\n\
             - Responde SOLO con información que esté explícitamente en el contexto\n\
             - Si no hay información suficiente, indícalo claramente\n\
             - NUNCA inventes información médica\n\
             - Incluye fechas y detalles relevantes cuando estén disponibles\n\n\
             RESPUESTA:"
        ),
        Intent::ConditionList => format!(
            "Basándote en la información médica proporcionada, genera una lista de pacientes que \
             cumplen con el criterio solicitado.\n\n\
             INFORMACIÓN MÉDICA DISPONIBLE:\n{context}\n\n\
             CONSULTA: {query}\n\n\
             INSTRUCCIONES:\n\
             - Lista SOLO pacientes que aparezcan en la información proporcionada\n\
             - Menciona cada paciente exactamente una vez\n\
             - Incluye el diagnóstico y la fecha de cada paciente cuando estén disponibles\n\
             - Indica el número total de pacientes encontrados\n\
             - Si no hay pacientes que cumplan el criterio, indícalo claramente\n\n\
             RESPUESTA:"
        ),
        _ => {
            let entities = describe_entities(plan);
            format!(
                "Basándote en la información médica proporcionada, responde la consulta de manera \
                 precisa y responsable.\n\n\
                 INFORMACIÓN MÉDICA DISPONIBLE:\n{context}\n\n\
                 CONSULTA: {query}\n\
                 ENTIDADES DETECTADAS: {entities}\n\n\
                 INSTRUCCIONES:\n\
                 - Responde basándote ÚNICAMENTE en la información proporcionada\n\
                 - Si la información es insuficiente, dilo claramente\n\
                 - NUNCA inventes datos médicos\n\n\
                 RESPUESTA:"
            )
        }
    }
}

fn describe_entities(plan: &QueryPlan) -> String {
    let mut parts = Vec::new();
    if !plan.entities.patients.is_empty() {
        parts.push(format!("pacientes: {}", plan.entities.patients.join(", ")));
    }
    if !plan.entities.conditions.is_empty() {
        parts.push(format!("condiciones: {}", plan.entities.conditions.join(", ")));
    }
    if !plan.entities.symptoms.is_empty() {
        parts.push(format!("síntomas: {}", plan.entities.symptoms.join(", ")));
    }
    if !plan.entities.medications.is_empty() {
        parts.push(format!(
            "medicamentos: {}",
            plan.entities.medications.join(", ")
        ));
    }
    if parts.is_empty() {
        "ninguna".to_string()
    } else {
        parts.join("; ")
    }
}

/// Trim, cap at 2 000 chars, append the disclaimer when medical terms are
/// present; empty answers fall back.
pub fn validate_answer(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FALLBACK_ANSWER.to_string();
    }
    let mut answer = truncate_chars(trimmed, ANSWER_MAX_CHARS);

    let lower = answer.to_lowercase();
    let medical_terms = ["diagnóstico", "medicamento", "tratamiento", "enfermedad"];
    if medical_terms.iter().any(|t| lower.contains(t)) {
        answer.push_str(MEDICAL_DISCLAIMER);
    }
    answer
}

/// `0.60·mean(top-3 score) + 0.20·entity_hit_ratio + 0.15·min(n/3, 1) −
/// 0.05·incompleteness`, clamped to [0.1, 0.95].
pub fn compute_confidence(plan: &QueryPlan, contexts: &[RankedContext], answer: &str) -> f32 {
    if contexts.is_empty() {
        return FALLBACK_CONFIDENCE;
    }

    let top = contexts.len().min(3);
    let mean_score: f32 = contexts[..top].iter().map(|c| c.final_score).sum::<f32>() / top as f32;

    let entity_hit_ratio = {
        let tokens: Vec<String> = plan
            .entities
            .patients
            .iter()
            .chain(plan.entities.conditions.iter())
            .chain(plan.entities.symptoms.iter())
            .chain(plan.entities.medications.iter())
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            0.0
        } else {
            let hits = tokens
                .iter()
                .filter(|t| {
                    contexts
                        .iter()
                        .any(|c| c.payload_text.to_lowercase().contains(*t))
                })
                .count();
            hits as f32 / tokens.len() as f32
        }
    };

    let source_factor = (contexts.len() as f32 / 3.0).min(1.0);

    let lower = answer.to_lowercase();
    let incomplete = lower.contains("insuficiente") || lower.contains("no se encontr");
    let penalty = if incomplete { 0.05 } else { 0.0 };

    (0.60 * mean_score + 0.20 * entity_hit_ratio + 0.15 * source_factor - penalty)
        .clamp(0.1, 0.95)
}

/// At most three intent-specific suggestions, parameterized with observed
/// entities.
pub fn follow_up_suggestions(plan: &QueryPlan) -> Vec<String> {
    let suggestions = match plan.intent {
        Intent::PatientInfo | Intent::MedicationInfo
            if !plan.entities.patients.is_empty() =>
        {
            let patient = &plan.entities.patients[0];
            vec![
                format!("¿Qué tratamiento se recomendó para {}?", patient),
                format!("¿Cuándo fue la última consulta de {}?", patient),
                format!("¿Qué síntomas reportó {}?", patient),
            ]
        }
        Intent::ConditionList | Intent::SymptomSearch
            if !plan.entities.conditions.is_empty() =>
        {
            let condition = &plan.entities.conditions[0];
            vec![
                format!("¿Qué tratamientos hay para {}?", condition),
                format!("¿Cuántos pacientes nuevos con {} hay este mes?", condition),
                format!("¿Qué síntomas son más comunes en {}?", condition),
            ]
        }
        _ => vec![
            "¿Puedes mostrarme información de un paciente específico?".to_string(),
            "¿Qué pacientes tienen una condición particular?".to_string(),
            "¿Cuáles son los síntomas más reportados?".to_string(),
        ],
    };
    suggestions.into_iter().take(3).collect()
}
