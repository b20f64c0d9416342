//! Edit orchestrator: the per-request state machine.
//!
//! LOAD → CLASSIFY → {FAST_UPDATE | FORM_APPLY | EXTRACT → FORM_APPLY | no-op}
//! → (fast-path miss) PATCH_GEN → PATCH_APPLY → (failure) FALLBACK → SAVE.
//!
//! SAVE is the only state that writes: every request persists exactly one
//! version. LLM and parsing failures degrade into a saved document with
//! `error` populated; only store failures and malformed requests surface
//! as `Err`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::classify::classify_intent;
use super::diff::diff_documents;
use super::extract::extract_metrics;
use super::fallback::regenerate_fields;
use super::fast_path::{apply_sections, RegexSectionExtractor, SectionExtractor};
use super::form::{
    apply_finding_form, apply_form_payloads, delete_finding, extract_form_payloads, list_findings,
    FindingFormRequest, FormPayloads,
};
use super::merge::DedupMode;
use super::parser::{extract_inci_name, parse_patch_operation};
use super::patch::{apply_validated, validate_patch};
use super::prompt::{build_patch_prompt, patch_operation_schema, PATCH_SYSTEM_PROMPT};
use super::types::{EditOutcome, EditRequest, InitialDocument, LlmClient};
use super::EditError;
use crate::db::VersionStore;
use crate::models::{
    blank_template, document_inci, set_inci, EditIntent, NewVersion, PatchOperation,
    VersionRecord, PLACEHOLDER_INCI,
};

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditStage {
    Load,
    Classify,
    FastUpdate,
    FormApply,
    Extract,
    PatchGen,
    PatchApply,
    Fallback,
    Save,
}

/// Everything one request carries between stages. Stages never mutate a
/// context in place; each `with_*` consumes it and returns the next one.
#[derive(Debug, Clone)]
pub struct EditContext {
    pub conversation_id: String,
    pub instruction: String,
    pub inci: String,
    pub batch_id: Option<String>,
    pub stage: EditStage,
    pub intent: EditIntent,
    pub document: Value,
    pub patches: Vec<PatchOperation>,
    pub summary: Option<String>,
    pub response: String,
    pub error: Option<String>,
    pub fast_done: bool,
    pub patch_success: bool,
    pub fallback_used: bool,
}

impl EditContext {
    pub fn new(
        conversation_id: String,
        instruction: String,
        inci: String,
        document: Value,
        batch_id: Option<String>,
    ) -> Self {
        Self {
            conversation_id,
            instruction,
            inci,
            batch_id,
            stage: EditStage::Load,
            intent: EditIntent::NoEdit,
            document,
            patches: Vec::new(),
            summary: None,
            response: String::new(),
            error: None,
            fast_done: false,
            patch_success: false,
            fallback_used: false,
        }
    }

    pub fn with_stage(self, stage: EditStage) -> Self {
        tracing::debug!(stage = ?stage, "Edit stage");
        Self { stage, ..self }
    }

    pub fn with_intent(self, intent: EditIntent) -> Self {
        Self { intent, ..self }
    }

    pub fn with_document(self, document: Value) -> Self {
        Self { document, ..self }
    }

    pub fn with_inci(self, inci: impl Into<String>) -> Self {
        Self {
            inci: inci.into(),
            ..self
        }
    }

    pub fn with_patches(self, patches: Vec<PatchOperation>) -> Self {
        Self { patches, ..self }
    }

    pub fn with_summary(self, summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..self
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..self
        }
    }

    pub fn with_error(self, error: Option<String>) -> Self {
        Self { error, ..self }
    }

    pub fn with_fast_done(self, fast_done: bool) -> Self {
        Self { fast_done, ..self }
    }

    pub fn with_patch_success(self, patch_success: bool) -> Self {
        Self {
            patch_success,
            ..self
        }
    }

    pub fn with_fallback_used(self, fallback_used: bool) -> Self {
        Self {
            fallback_used,
            ..self
        }
    }

    /// Summary recorded on the saved version.
    pub fn modification_summary(&self) -> String {
        self.summary
            .clone()
            .unwrap_or_else(|| "final-save".to_string())
    }
}

// ---------------------------------------------------------------------------
// Finding-form results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FindingFormResult {
    pub conversation_id: String,
    /// Version written, or the current one when a duplicate was skipped.
    pub version: Option<i64>,
    pub field: String,
    pub added: bool,
    pub entries_count: usize,
    pub message: String,
    pub document: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingDeletion {
    pub conversation_id: String,
    pub version: i64,
    pub field: String,
    pub deleted_entry: Value,
    pub remaining_count: usize,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct EditOrchestrator {
    store: Arc<dyn VersionStore>,
    llm: Box<dyn LlmClient + Send + Sync>,
    extractor: Box<dyn SectionExtractor>,
    model_name: String,
    dedup_mode: DedupMode,
}

impl EditOrchestrator {
    pub fn new(
        store: Arc<dyn VersionStore>,
        llm: Box<dyn LlmClient + Send + Sync>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            llm,
            extractor: Box::new(RegexSectionExtractor),
            model_name: model_name.into(),
            dedup_mode: DedupMode::Baseline,
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn SectionExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_dedup_mode(mut self, mode: DedupMode) -> Self {
        self.dedup_mode = mode;
        self
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dedup_mode(&self) -> DedupMode {
        self.dedup_mode
    }

    /// Run one edit to completion and persist exactly one version.
    pub fn edit(&self, request: EditRequest) -> Result<EditOutcome, EditError> {
        let conversation_id = resolve_conversation_id(request.conversation_id.as_deref())?;
        let span = tracing::info_span!(
            "edit",
            conversation_id = %conversation_id,
            intent = tracing::field::Empty
        );
        let _guard = span.enter();

        // LOAD
        let document = self.load_document(&conversation_id, &request.initial)?;
        let inci = resolve_inci(
            request.inci_name.as_deref(),
            &request.instruction,
            &document,
        );
        let document = adopt_inci(document, &inci);
        let ctx = EditContext::new(
            conversation_id,
            request.instruction,
            inci,
            document,
            request.batch_id,
        );

        // CLASSIFY
        let ctx = ctx.with_stage(EditStage::Classify);
        let intent = classify_intent(&ctx.instruction, self.llm.as_ref(), &self.model_name);
        span.record("intent", intent.as_str());
        tracing::info!(intent = %intent, inci = %ctx.inci, "Instruction classified");
        let ctx = ctx.with_intent(intent);

        let ctx = match intent {
            EditIntent::FormEditStructured => self.run_structured_form(ctx),
            EditIntent::FormEditRaw => self.run_raw_form(ctx),
            EditIntent::NliEdit => self.run_nli(ctx),
            EditIntent::NoEdit => ctx.with_response("No changes requested."),
        };

        self.save(ctx)
    }

    /// Apply form payloads directly (no classification) and save.
    pub fn apply_form(
        &self,
        conversation_id: Option<&str>,
        payloads: &FormPayloads,
        inci_name: Option<&str>,
    ) -> Result<EditOutcome, EditError> {
        let conversation_id = resolve_conversation_id(conversation_id)?;
        let _span = tracing::info_span!("apply_form", conversation_id = %conversation_id).entered();

        let document = self.load_document(&conversation_id, &InitialDocument::FromStore)?;
        let inci = resolve_inci(inci_name, "", &document);
        let ctx = EditContext::new(conversation_id, String::new(), inci, document, None)
            .with_intent(EditIntent::FormEditStructured);
        let ctx = self.form_apply(ctx, payloads);
        self.save(ctx)
    }

    /// Add one Finding through the generic form. A strict duplicate is not
    /// added and writes nothing.
    pub fn submit_finding(
        &self,
        conversation_id: &str,
        field: &str,
        request: &FindingFormRequest,
    ) -> Result<FindingFormResult, EditError> {
        let conversation_id = resolve_conversation_id(Some(conversation_id))?;
        let latest = self.store.get_latest(&conversation_id)?;
        let current_version = latest.as_ref().map(|r| r.version);
        let document = latest.map(|r| r.data).unwrap_or_else(blank_template);

        let outcome = apply_finding_form(field, request, &document)?;

        let version = if outcome.added {
            let record = self.store.append_version(
                &conversation_id,
                NewVersion::new(outcome.document.clone(), format!("finding form: add {field}"))
                    .with_patches(vec![PatchOperation::add(
                        format!("/{field}/-"),
                        outcome
                            .document
                            .get(field)
                            .and_then(|l| l.as_array())
                            .and_then(|l| l.last())
                            .cloned()
                            .unwrap_or(Value::Null),
                    )])
                    .with_inci(Some(request.inci_name.as_str())),
            )?;
            tracing::info!(conversation_id = %conversation_id, field, version = record.version, "Finding added");
            Some(record.version)
        } else {
            tracing::info!(conversation_id = %conversation_id, field, "Duplicate finding skipped");
            current_version
        };

        Ok(FindingFormResult {
            conversation_id,
            version,
            field: outcome.field,
            added: outcome.added,
            entries_count: outcome.entries_count,
            message: outcome.message,
            document: outcome.document,
        })
    }

    pub fn list_findings(
        &self,
        conversation_id: &str,
        field: &str,
    ) -> Result<Vec<Value>, EditError> {
        let document = self.load_document(conversation_id, &InitialDocument::FromStore)?;
        list_findings(&document, field)
    }

    /// Remove one Finding by index and save the result.
    pub fn delete_finding(
        &self,
        conversation_id: &str,
        field: &str,
        index: usize,
    ) -> Result<FindingDeletion, EditError> {
        let document = self.load_document(conversation_id, &InitialDocument::FromStore)?;
        let (updated, removed) = delete_finding(&document, field, index)?;
        let remaining_count = updated
            .get(field)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        let record = self.store.append_version(
            conversation_id,
            NewVersion::new(updated, format!("finding form: delete {field}[{index}]"))
                .with_patches(vec![PatchOperation::remove(format!("/{field}/{index}"))])
                .with_inci(document_inci(&document)),
        )?;

        Ok(FindingDeletion {
            conversation_id: record.conversation_id,
            version: record.version,
            field: field.to_string(),
            deleted_entry: removed,
            remaining_count,
        })
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Latest stored version, else the request's seed, else the blank template.
    fn load_document(
        &self,
        conversation_id: &str,
        initial: &InitialDocument,
    ) -> Result<Value, EditError> {
        if let InitialDocument::Cached(doc) = initial {
            return Ok(doc.clone());
        }

        let latest = self.store.get_latest(conversation_id).map_err(|e| {
            tracing::error!(conversation_id, error = %e, "Version store read failed");
            EditError::StoreUnavailable(e)
        })?;

        Ok(match (latest, initial) {
            (Some(record), _) => {
                tracing::debug!(conversation_id, version = record.version, "Loaded latest version");
                record.data
            }
            (None, InitialDocument::Seed(seed)) => seed.clone(),
            (None, _) => blank_template(),
        })
    }

    fn run_nli(&self, ctx: EditContext) -> EditContext {
        // FAST_UPDATE
        let ctx = ctx.with_stage(EditStage::FastUpdate);
        let sections = self.extractor.extract(&ctx.instruction);
        if !sections.is_empty() {
            let outcome = apply_sections(&ctx.document, &sections, self.dedup_mode);
            if outcome.fast_done() {
                tracing::info!(fields = ?outcome.applied, "Fast-path update applied");
                let response = outcome.response(&ctx.inci);
                let summary = outcome.summary();
                return ctx
                    .with_document(outcome.document)
                    .with_patches(outcome.patches)
                    .with_fast_done(true)
                    .with_summary(summary)
                    .with_response(response);
            }
        }

        // PATCH_GEN
        let ctx = ctx.with_stage(EditStage::PatchGen);
        let generated = self
            .llm
            .generate_structured(
                &self.model_name,
                &build_patch_prompt(&ctx.document, &ctx.instruction, &ctx.inci),
                PATCH_SYSTEM_PROMPT,
                &patch_operation_schema(),
            )
            .and_then(parse_patch_operation);

        let op = match generated {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(error = %e, "Patch generation failed, using full-document fallback");
                return self.run_fallback(ctx);
            }
        };

        // PATCH_APPLY
        let ctx = ctx.with_stage(EditStage::PatchApply);
        let applied = validate_patch(&op)
            .and_then(|valid| apply_validated(&ctx.document, &valid).map(|doc| (doc, valid)))
            .map_err(EditError::from);

        match applied {
            Ok((document, valid)) => {
                tracing::info!(op = %valid.op, path = %valid.path, "Patch applied");
                let response = format!(
                    "Applied {} operation at {} for {}",
                    valid.op, valid.path, ctx.inci
                );
                let summary = valid.summary();
                ctx.with_document(document)
                    .with_patches(vec![valid])
                    .with_patch_success(true)
                    .with_summary(summary)
                    .with_response(response)
            }
            Err(e) => {
                tracing::warn!(op = %op.op, path = %op.path, error = %e, "Patch invalid, using full-document fallback");
                self.run_fallback(ctx)
            }
        }
    }

    fn run_fallback(&self, ctx: EditContext) -> EditContext {
        let ctx = ctx.with_stage(EditStage::Fallback);
        let outcome = regenerate_fields(
            &ctx.document,
            &ctx.instruction,
            &ctx.inci,
            self.llm.as_ref(),
            &self.model_name,
            self.dedup_mode,
        );

        let patches = diff_documents(&ctx.document, &outcome.document);
        let inci = document_inci(&outcome.document)
            .map(str::to_string)
            .unwrap_or_else(|| ctx.inci.clone());
        let response = outcome.response();
        let summary = outcome.summary();

        ctx.with_document(outcome.document)
            .with_inci(inci)
            .with_patches(patches)
            .with_fallback_used(true)
            .with_summary(summary)
            .with_response(response)
            .with_error(outcome.error)
    }

    fn run_structured_form(&self, ctx: EditContext) -> EditContext {
        let payloads = extract_form_payloads(&ctx.instruction);
        if payloads.is_empty() {
            tracing::warn!("Structured form input carried no NOAEL or DAP payload");
        }
        self.form_apply(ctx, &payloads)
    }

    fn run_raw_form(&self, ctx: EditContext) -> EditContext {
        let ctx = ctx.with_stage(EditStage::Extract);
        match extract_metrics(&ctx.instruction, self.llm.as_ref(), &self.model_name) {
            Ok(extraction) => {
                let inci = extraction.inci_name.clone().unwrap_or_else(|| ctx.inci.clone());
                let ctx = ctx.with_inci(inci);
                self.form_apply(ctx, &extraction.payloads)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Correction-form extraction yielded nothing");
                ctx.with_response("Could not extract NOAEL or DAP data from the provided text.")
                    .with_error(Some(e.to_string()))
            }
        }
    }

    fn form_apply(&self, ctx: EditContext, payloads: &FormPayloads) -> EditContext {
        let ctx = ctx.with_stage(EditStage::FormApply);
        let outcome = apply_form_payloads(&ctx.document, payloads, &ctx.inci);
        let patches = diff_documents(&ctx.document, &outcome.document);
        let inci = document_inci(&outcome.document)
            .map(str::to_string)
            .unwrap_or_else(|| ctx.inci.clone());
        let summary = outcome.summary();
        let error = outcome.error();

        ctx.with_document(outcome.document)
            .with_inci(inci)
            .with_patches(patches)
            .with_summary(summary)
            .with_response(outcome.response)
            .with_error(error)
    }

    /// SAVE: the single terminal state.
    fn save(&self, ctx: EditContext) -> Result<EditOutcome, EditError> {
        let ctx = ctx.with_stage(EditStage::Save);
        let summary = ctx.modification_summary();

        let new = NewVersion::new(ctx.document.clone(), summary.clone())
            .with_patches(ctx.patches.clone())
            .with_inci(Some(&ctx.inci))
            .with_batch(ctx.batch_id.as_deref())
            .with_flags(ctx.patch_success, ctx.fallback_used);

        let record: VersionRecord = self
            .store
            .append_version(&ctx.conversation_id, new)
            .map_err(|e| {
                tracing::error!(conversation_id = %ctx.conversation_id, error = %e, "Version save failed");
                EditError::StoreUnavailable(e)
            })?;

        tracing::info!(
            conversation_id = %record.conversation_id,
            version = record.version,
            summary = %summary,
            patches = ctx.patches.len(),
            "Edit saved"
        );

        Ok(EditOutcome {
            conversation_id: record.conversation_id,
            version: record.version,
            document: record.data,
            response: ctx.response,
            intent: ctx.intent,
            error: ctx.error,
            fast_done: ctx.fast_done,
            patch_success: ctx.patch_success,
            fallback_used: ctx.fallback_used,
            patches: ctx.patches,
            summary,
        })
    }
}

fn resolve_conversation_id(requested: Option<&str>) -> Result<String, EditError> {
    match requested {
        Some(id) if id.trim().is_empty() => Err(EditError::InvalidRequest(
            "conversation_id must not be blank".into(),
        )),
        Some(id) => Ok(id.trim().to_string()),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

/// Request name, else a name in the instruction, else the document's own,
/// else the placeholder.
fn resolve_inci(requested: Option<&str>, instruction: &str, document: &Value) -> String {
    requested
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| extract_inci_name(instruction))
        .or_else(|| document_inci(document).map(str::to_string))
        .unwrap_or_else(|| PLACEHOLDER_INCI.to_string())
}

/// A document still carrying the placeholder takes the resolved name.
fn adopt_inci(mut document: Value, inci: &str) -> Value {
    let unnamed = document_inci(&document).map_or(true, |n| n == PLACEHOLDER_INCI);
    if unnamed && inci != PLACEHOLDER_INCI {
        set_inci(&mut document, inci);
    }
    document
}
