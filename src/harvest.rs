//! Artifact harvest: discover, validate, dedup, name, upload, clean up.
//!
//! Runs once per execution. Every step is best-effort per item: a bad or
//! unuploadable artifact becomes a failure record and the pass moves on. All
//! bookkeeping (digest set, claimed names) is local to one pass.

use crate::backend::ExecutionBackend;
use crate::error::{ArtifactError, StorageError};
use crate::executor::{ExecutionResult, InlinePayload, PayloadKind};
use crate::fingerprint::{fingerprint, ContentDigest};
use crate::session::SessionHandle;
use crate::store::ArtifactStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Leading bytes of a zip container, shared by xlsx and plain zip files.
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Extensions whose contents must be a zip container.
const ZIP_CONTAINER_EXTENSIONS: [&str; 2] = ["xlsx", "zip"];

/// Fallback identity token for callers that did not present one.
const ANONYMOUS_CALLER: &str = "anonymous";

/// One artifact persisted to object storage.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedArtifact {
    /// Globally unique key the artifact lives under.
    pub external_name: String,
    /// Retrievable locator returned to the caller.
    pub reference: String,
}

/// One artifact that could not be fully processed.
#[derive(Debug)]
pub struct ArtifactFailure {
    pub source_name: String,
    pub error: ArtifactError,
}

impl Serialize for ArtifactFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("ArtifactFailure", 3)?;
        st.serialize_field("source_name", &self.source_name)?;
        st.serialize_field("kind", self.error.kind())?;
        st.serialize_field("detail", &self.error.to_string())?;
        st.end()
    }
}

/// Outcome of one harvest pass. `uploaded` preserves discovery order: inline
/// payloads first, then filesystem artifacts.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub uploaded: Vec<UploadedArtifact>,
    pub failures: Vec<ArtifactFailure>,
}

/// Enumeration scope for filesystem artifacts.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Directory the executed code writes its outputs to.
    pub output_dir: String,
    /// Also scan the session root, as older deployments did.
    pub scan_session_root: bool,
}

pub struct Harvester {
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<dyn ArtifactStore>,
    config: HarvestConfig,
}

/// Per-pass bookkeeping. Built fresh for every call, never shared.
struct Pass {
    report: HarvestReport,
    seen_digests: HashSet<ContentDigest>,
    claimed_names: HashSet<String>,
    name_stamp: String,
    caller: String,
    deadline: Instant,
}

impl Pass {
    fn new(caller: Option<&str>, deadline: Instant) -> Self {
        Self {
            report: HarvestReport::default(),
            seen_digests: HashSet::new(),
            claimed_names: HashSet::new(),
            name_stamp: Utc::now().format("%Y%m%d-%H%M%S").to_string(),
            caller: caller.unwrap_or(ANONYMOUS_CALLER).to_string(),
            deadline,
        }
    }

    /// Key layout: `{caller}/{second-granularity stamp}/{source_name}`. Two
    /// callers producing the same file name in the same second land on
    /// different keys.
    fn external_name(&self, source_name: &str) -> String {
        format!("{}/{}/{}", self.caller, self.name_stamp, source_name)
    }

    fn out_of_time(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn fail(&mut self, source_name: &str, error: ArtifactError) {
        warn!(artifact = source_name, error = %error, "artifact failure");
        self.report.failures.push(ArtifactFailure {
            source_name: source_name.to_string(),
            error,
        });
    }
}

impl Harvester {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn ArtifactStore>,
        config: HarvestConfig,
    ) -> Self {
        Self { backend, store, config }
    }

    /// Collect and upload everything `result` produced in `session`.
    ///
    /// `deadline` bounds the pass: once it passes, remaining artifacts are
    /// skipped and whatever was already uploaded is returned.
    pub async fn harvest(
        &self,
        session: &SessionHandle,
        result: &ExecutionResult,
        caller: Option<&str>,
        deadline: Instant,
    ) -> HarvestReport {
        let mut pass = Pass::new(caller, deadline);

        self.harvest_inline(&mut pass, &result.inline_payloads).await;
        self.harvest_files(&mut pass, session).await;

        info!(
            session = %session.id,
            uploaded = pass.report.uploaded.len(),
            failures = pass.report.failures.len(),
            "harvest complete"
        );
        pass.report
    }

    /// Step 1: decode and upload inline image payloads.
    async fn harvest_inline(&self, pass: &mut Pass, payloads: &[InlinePayload]) {
        for (idx, payload) in payloads.iter().enumerate() {
            if pass.out_of_time() {
                warn!("request budget exhausted, skipping remaining inline payloads");
                return;
            }
            let source_name = inline_source_name(payload, idx);
            let bytes = match BASE64.decode(payload.data.as_bytes()) {
                Ok(bytes) => bytes,
                Err(err) => {
                    pass.fail(&source_name, ArtifactError::ReadFailed(err.to_string()));
                    continue;
                }
            };
            self.upload(pass, &source_name, &bytes, payload.kind.content_type())
                .await;
        }
    }

    /// Step 2 onward: enumerate the session filesystem and process each file.
    async fn harvest_files(&self, pass: &mut Pass, session: &SessionHandle) {
        let mut dirs = vec![self.config.output_dir.clone()];
        if self.config.scan_session_root {
            dirs.push("/".to_string());
        }

        for dir in dirs {
            if pass.out_of_time() {
                warn!("request budget exhausted, skipping remaining directories");
                return;
            }
            let entries = match self.backend.list_files(&session.id, &dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    pass.fail(&dir, ArtifactError::ReadFailed(err.to_string()));
                    continue;
                }
            };

            for entry in entries {
                if pass.out_of_time() {
                    warn!("request budget exhausted, skipping remaining files");
                    return;
                }
                if entry.is_directory || entry.name.starts_with('.') {
                    continue;
                }
                if pass.claimed_names.contains(&entry.name) {
                    continue;
                }
                self.harvest_file(pass, session, &entry.name, &entry.path).await;
            }
        }
    }

    async fn harvest_file(
        &self,
        pass: &mut Pass,
        session: &SessionHandle,
        name: &str,
        path: &str,
    ) {
        let bytes = match self.backend.read_file(&session.id, path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                pass.fail(name, ArtifactError::ReadFailed(err.to_string()));
                return;
            }
        };

        if claims_zip_container(name) && !bytes.starts_with(&ZIP_SIGNATURE) {
            pass.fail(
                name,
                ArtifactError::Corrupted(format!("{} lacks a zip container signature", name)),
            );
            return;
        }

        if !self.upload(pass, name, &bytes, content_type_for(name)).await {
            return;
        }

        // Uploaded copies are removed so the next run in this session does not
        // re-harvest them. Typed delete, never remote code.
        if let Err(err) = self.backend.delete_file(&session.id, path).await {
            pass.fail(name, ArtifactError::CleanupFailed(err.to_string()));
        }
    }

    /// Steps 4 to 6 for one artifact: dedup, name, upload. Returns whether the
    /// artifact now exists in the store.
    async fn upload(
        &self,
        pass: &mut Pass,
        source_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> bool {
        let digest = fingerprint(bytes);
        if !pass.seen_digests.insert(digest) {
            info!(artifact = source_name, "skipping duplicate content");
            return false;
        }

        let external_name = pass.external_name(source_name);
        match self.store.put(&external_name, bytes, content_type).await {
            Ok(reference) => {
                pass.claimed_names.insert(source_name.to_string());
                pass.report.uploaded.push(UploadedArtifact { external_name, reference });
                true
            }
            Err(err) => {
                // Let a later byte-identical artifact try again.
                pass.seen_digests.remove(&digest);
                let detail = match err {
                    StorageError::Transient(d) | StorageError::Permanent(d) => d,
                };
                pass.fail(source_name, ArtifactError::UploadFailed(detail));
                false
            }
        }
    }
}

/// Name an inline payload from its label, or positionally (`plot1.png`, ...)
/// when it has none.
fn inline_source_name(payload: &InlinePayload, idx: usize) -> String {
    let ext = payload.kind.extension();
    match &payload.label {
        Some(label) if label.ends_with(&format!(".{}", ext)) => label.clone(),
        Some(label) => format!("{}.{}", label, ext),
        None => format!("plot{}.{}", idx + 1, ext),
    }
}

fn claims_zip_container(name: &str) -> bool {
    extension_of(name)
        .map(|ext| ZIP_CONTAINER_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

fn content_type_for(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("xlsx") => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        Some("zip") => "application/zip",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(kind: PayloadKind, label: Option<&str>) -> InlinePayload {
        InlinePayload {
            kind,
            data: String::new(),
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn inline_names_fall_back_to_position() {
        assert_eq!(inline_source_name(&payload(PayloadKind::Png, None), 0), "plot1.png");
        assert_eq!(inline_source_name(&payload(PayloadKind::Jpeg, None), 2), "plot3.jpg");
    }

    #[test]
    fn inline_names_use_labels_without_doubling_extensions() {
        assert_eq!(
            inline_source_name(&payload(PayloadKind::Png, Some("revenue")), 0),
            "revenue.png"
        );
        assert_eq!(
            inline_source_name(&payload(PayloadKind::Png, Some("revenue.png")), 0),
            "revenue.png"
        );
    }

    #[test]
    fn zip_container_detection_is_extension_based() {
        assert!(claims_zip_container("out.xlsx"));
        assert!(claims_zip_container("OUT.XLSX"));
        assert!(claims_zip_container("bundle.zip"));
        assert!(!claims_zip_container("report.csv"));
        assert!(!claims_zip_container("noext"));
    }

    #[test]
    fn content_types_cover_common_outputs() {
        assert_eq!(content_type_for("a.csv"), "text/csv");
        assert_eq!(content_type_for("a.unknown"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
