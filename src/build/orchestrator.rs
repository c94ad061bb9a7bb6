use std::sync::Arc;

use super::assemble::{assemble_document, diagram_entries, DiagramEntry};
use super::{BuildError, BuildJob, BuildPhase, BuildReport, BuildRequest};
use crate::clients::{
    ClientError, NarrativeClient, NarrativeRequest, PlanningClient, PlanningRequest, PlanningResponse,
};
use crate::document::{write_docx, write_pdf, AssembledDocument, DiagramImage};
use crate::narrative::coerce_pages;
use crate::storage::{diagram_file_name, ExportStore};

/// Runs one build end to end: narrative, diagrams, assembly, persistence.
///
/// Only a narrative failure or a failed DOCX save fails the build. Every
/// diagram-side problem degrades to fewer (or zero) embedded images.
pub struct BuildOrchestrator {
    narrative: Arc<dyn NarrativeClient>,
    planning: Arc<dyn PlanningClient>,
    store: ExportStore,
}

impl BuildOrchestrator {
    pub fn new(narrative: Arc<dyn NarrativeClient>, planning: Arc<dyn PlanningClient>, store: ExportStore) -> Self {
        Self {
            narrative,
            planning,
            store,
        }
    }

    pub fn store(&self) -> &ExportStore {
        &self.store
    }

    pub fn run(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
        let code = required(request.code.as_deref(), "code")?;
        let project_info = required(request.project_info.as_deref(), "project_info")?;
        self.run_job(BuildJob::new(), request, code, project_info)
    }

    fn run_job(
        &self,
        mut job: BuildJob,
        request: &BuildRequest,
        code: &str,
        project_info: &str,
    ) -> Result<BuildReport, BuildError> {
        let build_id = job.build_id.clone();
        tracing::info!(%build_id, "Build started");

        // ── Narrative ───────────────────────────────────────────
        job.advance(BuildPhase::NarrativeRequested)?;
        let narrative_request = NarrativeRequest {
            code: code.to_string(),
            project_info: project_info.to_string(),
            instructions: request.instructions.clone(),
            pages: coerce_pages(request.pages.as_ref()),
            return_format: "markdown".to_string(),
        };
        let markdown = match self
            .narrative
            .generate_markdown(&narrative_request)
            .and_then(|md| if md.trim().is_empty() { Err(ClientError::Empty) } else { Ok(md) })
        {
            Ok(md) => {
                job.advance(BuildPhase::NarrativeReady)?;
                md
            }
            Err(e) => {
                job.advance(BuildPhase::NarrativeFailed)?;
                tracing::error!(%build_id, error = %e, "Failed to get markdown");
                return Err(BuildError::UpstreamGeneration(e));
            }
        };

        // ── Diagrams ────────────────────────────────────────────
        job.advance(BuildPhase::DiagramsRequested)?;
        let planning_request = PlanningRequest {
            build_id: Some(build_id.clone()),
            system_description: request
                .system_description
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(project_info)
                .to_string(),
            instructions: request.uml_instructions.clone().unwrap_or_default(),
        };
        let plan = match self.planning.plan_and_render(&planning_request) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(%build_id, error = %e, "Diagram service failed, continuing without diagrams");
                PlanningResponse {
                    status: "failed".into(),
                    diagrams: Vec::new(),
                    planned: Vec::new(),
                    duration: 0.0,
                }
            }
        };
        let entries = diagram_entries(&plan);
        job.advance(BuildPhase::DiagramsReady)?;
        tracing::info!(%build_id, planned = entries.len(), rendered = plan.diagrams.len(), "Diagram phase finished");

        // ── Assembly ────────────────────────────────────────────
        job.advance(BuildPhase::Assembling)?;
        let today = chrono::Local::now().date_naive();
        let doc = assemble_document(request.instructions.as_deref(), &markdown, &entries, today, |entry| {
            self.load_image(&build_id, entry)
        });

        match self.persist(&build_id, &doc) {
            Ok((docx, pdf)) => {
                job.advance(BuildPhase::Completed)?;
                tracing::info!(
                    %build_id,
                    diagrams = doc.embedded_images(),
                    elapsed_secs = job.elapsed_secs(),
                    "Build completed"
                );
                Ok(BuildReport {
                    build_id,
                    diagrams_count: doc.embedded_images(),
                    docx: Some(docx),
                    pdf,
                })
            }
            Err(e) => {
                job.advance(BuildPhase::AssemblyFailed)?;
                tracing::error!(%build_id, error = %e, "DOCX save failed");
                Err(e)
            }
        }
    }

    fn load_image(&self, build_id: &str, entry: &DiagramEntry) -> Option<DiagramImage> {
        let index = entry.index?;
        let Some(bytes) = self.store.load_diagram(build_id, &entry.diagram_type, index) else {
            tracing::warn!(
                build_id,
                diagram_type = %entry.diagram_type,
                index,
                "Missing image for diagram"
            );
            return None;
        };
        match DiagramImage::decode(&diagram_file_name(&entry.diagram_type, index), &bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(build_id, diagram_type = %entry.diagram_type, error = %e, "Failed to sanitize diagram");
                None
            }
        }
    }

    /// Save the DOCX (required) and the PDF (best effort). Returns their
    /// file names.
    fn persist(&self, build_id: &str, doc: &AssembledDocument) -> Result<(String, Option<String>), BuildError> {
        let stem = artifact_stem(build_id);
        let docx_name = format!("{stem}.docx");
        let docx = write_docx(doc).map_err(|e| BuildError::Assembly(e.to_string()))?;
        let path = self
            .store
            .save_artifact(&docx_name, &docx)
            .map_err(|e| BuildError::Assembly(e.to_string()))?;
        tracing::info!(build_id, path = %path.display(), size = docx.len(), "DOCX saved");

        let pdf_name = format!("{stem}.pdf");
        let pdf = match write_pdf(doc) {
            Ok(bytes) => match self.store.save_artifact(&pdf_name, &bytes) {
                Ok(path) => {
                    tracing::info!(build_id, path = %path.display(), "PDF saved");
                    Some(pdf_name)
                }
                Err(e) => {
                    tracing::error!(build_id, error = %e, "PDF save failed");
                    None
                }
            },
            Err(e) => {
                tracing::error!(build_id, error = %e, "PDF conversion failed");
                None
            }
        };
        Ok((docx_name, pdf))
    }
}

/// `combined_{unix_ts}_{first 8 of build_id}`
fn artifact_stem(build_id: &str) -> String {
    let short: String = build_id.chars().filter(|c| *c != '-').take(8).collect();
    format!("combined_{}_{short}", chrono::Utc::now().timestamp())
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, BuildError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BuildError::InvalidRequest(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::{record, FakeNarrative, FakePlanning, FakeRenderClient, StoreIngestion};
    use crate::api::endpoints::diagrams::planning_response;
    use crate::clients::PlanningClient;
    use crate::diagram::{DiagramPlanner, DiagramRenderer, DiagramSpec};
    use crate::llm::{LlmClient, MockLlmClient};
    use std::io::Read;

    fn request() -> BuildRequest {
        BuildRequest {
            code: Some("fn main() {}".into()),
            project_info: Some("A library system".into()),
            instructions: Some("Library Manager\nwrite a report".into()),
            pages: Some(serde_json::json!(2)),
            system_description: Some("Books, members and loans".into()),
            uml_instructions: None,
        }
    }

    fn document_xml(store: &ExportStore, docx: &str) -> String {
        let bytes = std::fs::read(store.export_dir().join(docx)).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive.by_name("word/document.xml").unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn build_with_all_diagrams() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        let narrative = Arc::new(FakeNarrative::markdown("# Intro\nHello **world**"));
        let planning = Arc::new(
            FakePlanning::new(
                vec![DiagramSpec::new("Class Diagram", "shows classes")],
                vec![record("Class_Diagram", "shows classes", 1)],
            )
            .ingesting_into(store.clone()),
        );
        let orchestrator = BuildOrchestrator::new(narrative.clone(), planning.clone(), store.clone());

        let report = orchestrator.run(&request()).unwrap();
        assert_eq!(report.diagrams_count, 1);
        let docx = report.docx.clone().unwrap();
        assert!(docx.starts_with("combined_") && docx.ends_with(".docx"));
        assert!(report.pdf.is_some());
        assert!(store.resolve_download(&docx).is_ok());

        let sent = &narrative.requests()[0];
        assert_eq!(sent.return_format, "markdown");
        assert_eq!(sent.pages, 2);
        let planned = &planning.requests()[0];
        assert_eq!(planned.build_id.as_deref(), Some(report.build_id.as_str()));
        assert_eq!(planned.system_description, "Books, members and loans");

        let xml = document_xml(&store, &docx);
        assert!(xml.contains("Technical Report"));
        assert!(xml.contains("Library Manager"));
        assert!(xml.contains("Hello world"));
        assert!(xml.contains("Class Diagram"));
        assert_eq!(xml.matches("<w:drawing>").count(), 1);
    }

    #[test]
    fn partial_diagram_failure_keeps_both_headings() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        let planning = Arc::new(
            FakePlanning::new(
                vec![
                    DiagramSpec::new("Class Diagram", "shows classes"),
                    DiagramSpec::new("Sequence Diagram", "shows flow"),
                ],
                vec![record("Sequence_Diagram", "shows flow", 1)],
            )
            .ingesting_into(store.clone()),
        );
        let orchestrator =
            BuildOrchestrator::new(Arc::new(FakeNarrative::markdown("Body")), planning, store.clone());

        let report = orchestrator.run(&request()).unwrap();
        assert_eq!(report.diagrams_count, 1);
        let xml = document_xml(&store, report.docx.as_deref().unwrap());
        let class_at = xml.find("Class Diagram").unwrap();
        let seq_at = xml.find("Sequence Diagram").unwrap();
        assert!(class_at < seq_at);
        assert_eq!(xml.matches("<w:drawing>").count(), 1);
    }

    #[test]
    fn narrative_failure_stops_before_diagrams() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        let planning = Arc::new(FakePlanning::empty());
        let orchestrator =
            BuildOrchestrator::new(Arc::new(FakeNarrative::failing(500)), planning.clone(), store.clone());

        let err = orchestrator.run(&request()).unwrap_err();
        assert!(matches!(err, BuildError::UpstreamGeneration(ClientError::Status { status: 500, .. })));
        assert!(planning.requests().is_empty());
        assert!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0) == 0);
    }

    #[test]
    fn blank_narrative_is_an_upstream_failure() {
        let dir = tempfile::tempdir().unwrap();
        let planning = Arc::new(FakePlanning::empty());
        let orchestrator = BuildOrchestrator::new(
            Arc::new(FakeNarrative::markdown("   ")),
            planning.clone(),
            ExportStore::new(dir.path()),
        );
        assert!(matches!(
            orchestrator.run(&request()),
            Err(BuildError::UpstreamGeneration(ClientError::Empty))
        ));
        assert!(planning.requests().is_empty());
    }

    #[test]
    fn diagram_service_outage_yields_narrative_only_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        let orchestrator = BuildOrchestrator::new(
            Arc::new(FakeNarrative::markdown("# Only text")),
            Arc::new(FakePlanning::failing()),
            store.clone(),
        );
        let report = orchestrator.run(&request()).unwrap();
        assert_eq!(report.diagrams_count, 0);
        let xml = document_xml(&store, report.docx.as_deref().unwrap());
        assert!(xml.contains("Only text"));
        assert!(!xml.contains(">Diagrams<"));
    }

    #[test]
    fn abstract_falls_back_to_project_info() {
        let dir = tempfile::tempdir().unwrap();
        let planning = Arc::new(FakePlanning::empty());
        let orchestrator = BuildOrchestrator::new(
            Arc::new(FakeNarrative::markdown("x")),
            planning.clone(),
            ExportStore::new(dir.path()),
        );
        let mut req = request();
        req.system_description = None;
        req.uml_instructions = Some("only two".into());
        orchestrator.run(&req).unwrap();
        let sent = &planning.requests()[0];
        assert_eq!(sent.system_description, "A library system");
        assert_eq!(sent.instructions, "only two");
    }

    #[test]
    fn missing_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let narrative = Arc::new(FakeNarrative::markdown("x"));
        let orchestrator =
            BuildOrchestrator::new(narrative.clone(), Arc::new(FakePlanning::empty()), ExportStore::new(dir.path()));
        let mut req = request();
        req.code = None;
        assert!(matches!(orchestrator.run(&req), Err(BuildError::InvalidRequest(_))));
        assert!(narrative.requests().is_empty());
    }

    #[test]
    fn unwritable_export_dir_is_an_assembly_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("exports");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let orchestrator = BuildOrchestrator::new(
            Arc::new(FakeNarrative::markdown("x")),
            Arc::new(FakePlanning::empty()),
            ExportStore::new(&blocker),
        );
        assert!(matches!(orchestrator.run(&request()), Err(BuildError::Assembly(_))));
    }

    #[test]
    fn undecodable_diagram_degrades_to_heading() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        let planning = Arc::new(FakePlanning::new(
            vec![DiagramSpec::new("Seq", "flow")],
            vec![record("Seq", "flow", 1)],
        ));
        let orchestrator =
            BuildOrchestrator::new(Arc::new(FakeNarrative::markdown("x")), planning.clone(), store.clone());

        // Pre-seed a corrupt file under the id the orchestrator will use.
        let report = {
            let job = BuildJob::with_id("fixed-build".into());
            store.ingest("fixed-build", "Seq", 1, b"garbage").unwrap();
            let req = request();
            orchestrator
                .run_job(job, &req, req.code.as_deref().unwrap(), req.project_info.as_deref().unwrap())
                .unwrap()
        };
        assert_eq!(report.build_id, "fixed-build");
        assert_eq!(report.diagrams_count, 0);
        let xml = document_xml(&store, report.docx.as_deref().unwrap());
        assert!(xml.contains(">Seq<"));
    }

    /// Planning client that runs the real planner and renderer in-process,
    /// ingesting into the same store the orchestrator reads from.
    struct InProcessDiagrams {
        llm: MockLlmClient,
        render: FakeRenderClient,
        ingest: StoreIngestion,
        static_dir: std::path::PathBuf,
    }

    impl PlanningClient for InProcessDiagrams {
        fn plan_and_render(&self, request: &PlanningRequest) -> Result<PlanningResponse, ClientError> {
            let build_id = request.build_id.as_deref().unwrap_or("default");
            let specs = DiagramPlanner::new(&self.llm as &dyn LlmClient)
                .plan(&request.system_description, &request.instructions)
                .map_err(|e| ClientError::Http(e.to_string()))?;
            let renderer = DiagramRenderer::new(&self.llm, &self.render, &self.ingest, "http://r", &self.static_dir);
            let reports = renderer
                .render_all(&specs, build_id)
                .map_err(|e| ClientError::Http(e.to_string()))?;
            Ok(planning_response(reports, 0.0))
        }
    }

    #[test]
    fn end_to_end_with_one_failing_render() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path().join("exports"));
        let fenced = "```plantuml\n@startuml\nA -> B\n@enduml\n```";
        let llm = MockLlmClient::scripted(vec![
            Ok("- Class Diagram: shows classes\n- garbage line\n- Sequence Diagram: shows flow".into()),
            Ok(fenced.into()),
            Ok(fenced.into()),
        ]);
        let diagrams = Arc::new(InProcessDiagrams {
            llm,
            render: FakeRenderClient::scripted(vec![
                (500, "text/plain", b"boom".to_vec()),
                (200, "image/png", crate::clients::fake::png(30, 20)),
            ]),
            ingest: StoreIngestion(store.clone()),
            static_dir: dir.path().join("static"),
        });
        let orchestrator =
            BuildOrchestrator::new(Arc::new(FakeNarrative::markdown("# Body")), diagrams, store.clone());

        let report = orchestrator.run(&request()).unwrap();
        assert_eq!(report.diagrams_count, 1);
        let xml = document_xml(&store, report.docx.as_deref().unwrap());
        assert!(xml.contains("Class Diagram"));
        assert!(xml.contains("Sequence Diagram"));
        assert_eq!(xml.matches("<w:drawing>").count(), 1);
        assert!(store
            .diagram_path(&report.build_id, "Sequence_Diagram", 1)
            .exists());
        assert!(!store.diagram_path(&report.build_id, "Class_Diagram", 1).exists());
    }

    #[test]
    fn artifact_names_are_namespaced_by_build() {
        let a = artifact_stem("3f2b8c1e-aaaa-4bbb-8ccc-123456789abc");
        assert!(a.starts_with("combined_"));
        assert!(a.ends_with("_3f2b8c1e"));
    }

    #[test]
    fn same_type_diagrams_each_keep_their_own_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path().join("exports"));
        let fenced = "```plantuml\n@startuml\nA -> B\n@enduml\n```";
        let llm = MockLlmClient::scripted(vec![
            Ok("- Sequence Diagram: login\n- Sequence Diagram: checkout".into()),
            Ok(fenced.into()),
        ]);
        let diagrams = Arc::new(InProcessDiagrams {
            llm,
            render: FakeRenderClient::scripted(vec![
                (200, "image/png", crate::clients::fake::png(30, 20)),
                (200, "image/png", crate::clients::fake::png(16, 40)),
            ]),
            ingest: StoreIngestion(store.clone()),
            static_dir: dir.path().join("static"),
        });
        let orchestrator =
            BuildOrchestrator::new(Arc::new(FakeNarrative::markdown("# Body")), diagrams, store.clone());

        let report = orchestrator.run(&request()).unwrap();
        let build_dir = store.build_dir(&report.build_id);
        assert_eq!(std::fs::read_dir(&build_dir).unwrap().count(), 2);
        assert_eq!(report.diagrams_count, 2);

        let xml = document_xml(&store, report.docx.as_deref().unwrap());
        assert_eq!(xml.matches("<w:drawing>").count(), 2);
        let login_at = xml.find("login").unwrap();
        let checkout_at = xml.find("checkout").unwrap();
        assert!(login_at < checkout_at);
        assert_eq!(xml.matches(">Sequence Diagram<").count(), 2);
    }
}
