use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::Regex;

use super::{sanitize_type, DiagramAsset, DiagramError, DiagramSpec};
use crate::clients::{DiagramUpload, IngestionClient, RenderClient};
use crate::encoder;
use crate::llm::LlmClient;
use crate::storage::{diagram_file_name, validate_build_id, write_atomic};

const SOURCE_SYSTEM: &str = "You are a PlantUML syntax expert.";
const FENCE: &str = "```";

/// Non-greedy: a fence marker inside the diagram source ends the block.
static PLANTUML_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```plantuml\s*(.*?)```").unwrap());

/// Result of one candidate block.
#[derive(Debug)]
pub enum CandidateOutcome {
    Rendered(DiagramAsset),
    /// `index` is `None` when the spec failed before any block was extracted.
    Failed {
        index: Option<u32>,
        reason: DiagramError,
    },
}

/// Every outcome for one planned spec, in block order.
#[derive(Debug)]
pub struct RenderReport {
    pub spec: DiagramSpec,
    /// 0-based position of `spec` in the plan.
    pub position: usize,
    /// Sanitized type used for file names.
    pub diagram_type: String,
    pub outcomes: Vec<CandidateOutcome>,
}

impl RenderReport {
    pub fn assets(&self) -> impl Iterator<Item = &DiagramAsset> {
        self.outcomes.iter().filter_map(|o| match o {
            CandidateOutcome::Rendered(asset) => Some(asset),
            CandidateOutcome::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CandidateOutcome::Failed { .. }))
            .count()
    }
}

/// Extract the body of every ```` ```plantuml ```` fenced block, in order.
/// Blank blocks are dropped.
pub fn extract_blocks(reply: &str) -> Vec<String> {
    if reply.matches(FENCE).count() % 2 != 0 {
        tracing::warn!("Unbalanced fence markers in diagram source reply");
    }
    PLANTUML_BLOCK
        .captures_iter(reply)
        .map(|caps| caps[1].to_string())
        .filter(|block| !block.trim().is_empty())
        .collect()
}

/// Hands out candidate indices per sanitized type, so `{type}_{index}.png`
/// stays unique across every spec of one build.
#[derive(Default)]
struct IndexAllocator {
    next: Mutex<HashMap<String, u32>>,
}

impl IndexAllocator {
    /// Reserve `count` consecutive indices for `diagram_type`; returns the first.
    fn reserve(&self, diagram_type: &str, count: usize) -> u32 {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = next.entry(diagram_type.to_string()).or_insert(1);
        let first = *slot;
        *slot += count as u32;
        first
    }
}

fn source_prompt(spec: &DiagramSpec) -> String {
    format!(
        "Output a fenced ```plantuml``` block for a {} diagram:\n{}\nOnly the fenced block.",
        spec.diagram_type, spec.description
    )
}

/// Turns planned specs into ingested diagram assets.
///
/// Every failure is caught per candidate and recorded in the spec's
/// `RenderReport`; `render_all` always returns one report per spec.
pub struct DiagramRenderer<'a> {
    llm: &'a dyn LlmClient,
    render: &'a dyn RenderClient,
    ingest: &'a dyn IngestionClient,
    render_base: String,
    local_dir: PathBuf,
    concurrency: usize,
}

impl<'a> DiagramRenderer<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        render: &'a dyn RenderClient,
        ingest: &'a dyn IngestionClient,
        render_base: &str,
        local_dir: &Path,
    ) -> Self {
        Self {
            llm,
            render,
            ingest,
            render_base: render_base.trim_end_matches('/').to_string(),
            local_dir: local_dir.to_path_buf(),
            concurrency: 1,
        }
    }

    /// Render up to `workers` specs at once. `1` keeps the sequential order.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn render_url(&self, source: &str) -> String {
        format!("{}/{}", self.render_base, encoder::encode(source))
    }

    /// Render every spec. Reports come back in `specs` order regardless of
    /// completion order, and only after every attempt has finished.
    ///
    /// Fails only for a `build_id` that is not a single safe path segment;
    /// nothing is written in that case.
    pub fn render_all(&self, specs: &[DiagramSpec], build_id: &str) -> Result<Vec<RenderReport>, DiagramError> {
        validate_build_id(build_id).map_err(DiagramError::BuildId)?;
        let indices = IndexAllocator::default();

        let workers = self.concurrency.min(specs.len());
        if workers <= 1 {
            return Ok(specs
                .iter()
                .enumerate()
                .map(|(i, spec)| self.render_spec(spec, i, specs.len(), build_id, &indices))
                .collect());
        }

        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<RenderReport>>> = specs.iter().map(|_| Mutex::new(None)).collect();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(spec) = specs.get(i) else { break };
                    let report = self.render_spec(spec, i, specs.len(), build_id, &indices);
                    if let Ok(mut slot) = slots[i].lock() {
                        *slot = Some(report);
                    }
                });
            }
        });

        Ok(slots
            .into_iter()
            .filter_map(|slot| slot.into_inner().ok().flatten())
            .collect())
    }

    fn render_spec(
        &self,
        spec: &DiagramSpec,
        position: usize,
        total: usize,
        build_id: &str,
        indices: &IndexAllocator,
    ) -> RenderReport {
        let diagram_type = sanitize_type(&spec.diagram_type);
        tracing::info!(build_id, %diagram_type, "Generating diagram [{}/{total}]", position + 1);

        let mut report = RenderReport {
            spec: spec.clone(),
            position,
            diagram_type,
            outcomes: Vec::new(),
        };

        let reply = match self.llm.generate(&source_prompt(spec), SOURCE_SYSTEM) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(build_id, diagram_type = %report.diagram_type, error = %e, "Diagram source generation failed");
                report.outcomes.push(CandidateOutcome::Failed {
                    index: None,
                    reason: DiagramError::Source(e),
                });
                return report;
            }
        };

        let blocks = extract_blocks(&reply);
        if blocks.is_empty() {
            tracing::warn!(build_id, diagram_type = %report.diagram_type, "No plantuml blocks in reply");
        }

        let first = indices.reserve(&report.diagram_type, blocks.len());
        for (i, source) in blocks.iter().enumerate() {
            let index = first + i as u32;
            let candidate = Candidate {
                build_id,
                diagram_type: &report.diagram_type,
                description: &spec.description,
                position,
                index,
            };
            let outcome = match self.render_candidate(&candidate, source) {
                Ok(asset) => CandidateOutcome::Rendered(asset),
                Err(reason) => {
                    tracing::warn!(
                        build_id,
                        diagram_type = %report.diagram_type,
                        index,
                        error = %reason,
                        "Diagram candidate discarded"
                    );
                    CandidateOutcome::Failed {
                        index: Some(index),
                        reason,
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    fn render_candidate(&self, candidate: &Candidate<'_>, source: &str) -> Result<DiagramAsset, DiagramError> {
        let Candidate {
            build_id,
            diagram_type,
            description,
            position,
            index,
        } = *candidate;
        let url = self.render_url(source);
        tracing::debug!(build_id, diagram_type, index, %url, "Fetching rendered diagram");

        let image = self.render.fetch(&url).map_err(DiagramError::Fetch)?;
        if image.status != 200 || !image.content_type.starts_with("image/") {
            return Err(DiagramError::NotAnImage {
                status: image.status,
                content_type: image.content_type,
            });
        }

        let path_local = self
            .local_dir
            .join(build_id)
            .join(diagram_file_name(diagram_type, index));
        write_atomic(&path_local, &image.bytes)?;
        tracing::info!(build_id, diagram_type, index, path = %path_local.display(), "Saved diagram");

        let ingested_path = self
            .ingest
            .ingest(&DiagramUpload {
                build_id,
                diagram_type,
                description,
                index,
                bytes: &image.bytes,
            })
            .map_err(DiagramError::Ingest)?;
        tracing::info!(build_id, diagram_type, index, path = %ingested_path, "Diagram ingested");

        Ok(DiagramAsset {
            build_id: build_id.to_string(),
            diagram_type: diagram_type.to_string(),
            description: description.to_string(),
            index,
            position,
            path_local,
            ingested_path,
        })
    }
}

#[derive(Clone, Copy)]
struct Candidate<'a> {
    build_id: &'a str,
    diagram_type: &'a str,
    description: &'a str,
    position: usize,
    index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::{png, FakeRenderClient, RecordingIngestion};
    use crate::llm::MockLlmClient;

    const BASE: &str = "http://render.test/png";

    fn fenced(src: &str) -> String {
        format!("```plantuml\n{src}\n```")
    }

    #[test]
    fn extracts_blocks_in_order() {
        let reply = format!(
            "Here you go:\n{}\nand also\n{}",
            fenced("@startuml\nA->B\n@enduml"),
            fenced("@startuml\nC->D\n@enduml")
        );
        let blocks = extract_blocks(&reply);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "@startuml\nA->B\n@enduml\n");
        assert!(blocks[1].contains("C->D"));
    }

    #[test]
    fn blank_and_foreign_blocks_are_ignored() {
        let reply = "```plantuml\n   \n```\n```python\nprint(1)\n```";
        assert!(extract_blocks(reply).is_empty());
    }

    #[test]
    fn fence_inside_source_truncates_block() {
        let reply = "```plantuml\n@startuml\nnote: ``` here\n@enduml\n```";
        let blocks = extract_blocks(reply);
        assert_eq!(blocks, vec!["@startuml\nnote: ".to_string()]);
    }

    #[test]
    fn scenario_single_diagram() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nclass A\n@enduml"));
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let specs = vec![DiagramSpec::new("Class Diagram", "shows classes")];
        let reports = renderer.render_all(&specs, "b1").unwrap();

        assert_eq!(reports.len(), 1);
        let assets: Vec<_> = reports[0].assets().collect();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].diagram_type, "Class_Diagram");
        assert_eq!(assets[0].index, 1);
        assert_eq!(assets[0].path_local, dir.path().join("b1/Class_Diagram_1.png"));
        assert!(assets[0].path_local.exists());

        let uploads = ingest.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].build_id, "b1");
        assert_eq!(uploads[0].diagram_type, "Class_Diagram");
        assert_eq!(uploads[0].description, "shows classes");
        assert_eq!(uploads[0].index, 1);

        let urls = render.urls();
        assert_eq!(urls[0], format!("{BASE}/{}", encoder::encode("@startuml\nclass A\n@enduml\n")));
    }

    #[test]
    fn non_image_response_is_isolated_to_its_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let reply = format!("{}\n{}", fenced("@startuml\nbad\n@enduml"), fenced("@startuml\nok\n@enduml"));
        let llm = MockLlmClient::new(&reply);
        let render = FakeRenderClient::scripted(vec![
            (200, "text/html", b"<html>".to_vec()),
            (200, "image/png", png(4, 4)),
        ]);
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let reports = renderer.render_all(&[DiagramSpec::new("Seq", "flow")], "b1").unwrap();
        let report = &reports[0];
        assert_eq!(report.failures(), 1);
        assert!(matches!(
            report.outcomes[0],
            CandidateOutcome::Failed { index: Some(1), reason: DiagramError::NotAnImage { status: 200, .. } }
        ));
        let assets: Vec<_> = report.assets().collect();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].index, 2);
        assert_eq!(ingest.uploads().len(), 1);
    }

    #[test]
    fn non_200_status_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::scripted(vec![(500, "image/png", png(2, 2))]);
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let reports = renderer.render_all(&[DiagramSpec::new("Seq", "flow")], "b1").unwrap();
        assert_eq!(reports[0].assets().count(), 0);
        assert!(ingest.uploads().is_empty());
        assert!(!dir.path().join("b1/Seq_1.png").exists());
    }

    #[test]
    fn rendering_outage_degrades_to_no_diagrams() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::unreachable();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let specs = vec![DiagramSpec::new("A", "a"), DiagramSpec::new("B", "b")];
        let reports = renderer.render_all(&specs, "b1").unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.assets().count() == 0 && r.failures() == 1));
    }

    #[test]
    fn source_failure_skips_only_that_spec() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::scripted(vec![
            Err("timeout".into()),
            Ok(fenced("@startuml\nB\n@enduml")),
        ]);
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let specs = vec![DiagramSpec::new("A", "a"), DiagramSpec::new("B", "b")];
        let reports = renderer.render_all(&specs, "b1").unwrap();
        assert!(matches!(
            reports[0].outcomes[0],
            CandidateOutcome::Failed { index: None, reason: DiagramError::Source(_) }
        ));
        assert_eq!(reports[1].assets().count(), 1);
    }

    #[test]
    fn ingestion_failure_discards_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::failing();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let reports = renderer.render_all(&[DiagramSpec::new("Seq", "flow")], "b1").unwrap();
        assert!(matches!(
            reports[0].outcomes[0],
            CandidateOutcome::Failed { reason: DiagramError::Ingest(_), .. }
        ));
    }

    #[test]
    fn concurrent_rendering_preserves_planner_order() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path()).with_concurrency(4);

        let specs: Vec<_> = (0..9)
            .map(|i| DiagramSpec::new(format!("Type {i}"), format!("desc {i}")))
            .collect();
        let reports = renderer.render_all(&specs, "b1").unwrap();

        assert_eq!(reports.len(), specs.len());
        for (report, spec) in reports.iter().zip(&specs) {
            assert_eq!(&report.spec, spec);
            assert_eq!(report.assets().count(), 1);
        }
        assert_eq!(ingest.uploads().len(), specs.len());
    }

    #[test]
    fn empty_plan_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new("unused");
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path()).with_concurrency(3);
        assert!(renderer.render_all(&[], "b1").unwrap().is_empty());
        assert!(llm.prompts().is_empty());
    }

    #[test]
    fn same_type_specs_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nA -> B\n@enduml"));
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let specs = vec![
            DiagramSpec::new("Sequence Diagram", "login"),
            DiagramSpec::new("Class", "model"),
            DiagramSpec::new("Sequence Diagram", "checkout"),
        ];
        let reports = renderer.render_all(&specs, "b1").unwrap();

        let login: Vec<_> = reports[0].assets().collect();
        let checkout: Vec<_> = reports[2].assets().collect();
        assert_eq!((login[0].index, login[0].position), (1, 0));
        assert_eq!((checkout[0].index, checkout[0].position), (2, 2));
        assert_eq!(reports[1].assets().next().unwrap().index, 1);
        assert!(dir.path().join("b1/Sequence_Diagram_1.png").exists());
        assert!(dir.path().join("b1/Sequence_Diagram_2.png").exists());

        let indices: Vec<_> = ingest.uploads().iter().map(|u| (u.diagram_type.clone(), u.index)).collect();
        assert_eq!(
            indices,
            vec![
                ("Sequence_Diagram".to_string(), 1),
                ("Class".to_string(), 1),
                ("Sequence_Diagram".to_string(), 2),
            ]
        );
    }

    #[test]
    fn failed_candidates_still_consume_their_index() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::scripted(vec![
            (500, "text/html", b"oops".to_vec()),
            (200, "image/png", png(4, 4)),
        ]);
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path());

        let specs = vec![DiagramSpec::new("Seq", "a"), DiagramSpec::new("Seq", "b")];
        let reports = renderer.render_all(&specs, "b1").unwrap();
        assert!(matches!(reports[0].outcomes[0], CandidateOutcome::Failed { index: Some(1), .. }));
        assert_eq!(reports[1].assets().next().unwrap().index, 2);
    }

    #[test]
    fn concurrent_same_type_indices_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, dir.path()).with_concurrency(4);

        let specs: Vec<_> = (0..8).map(|i| DiagramSpec::new("Sequence", format!("flow {i}"))).collect();
        let reports = renderer.render_all(&specs, "b1").unwrap();

        let mut indices: Vec<u32> = reports.iter().flat_map(|r| r.assets().map(|a| a.index)).collect();
        indices.sort_unstable();
        assert_eq!(indices, (1..=8).collect::<Vec<_>>());
        for (position, report) in reports.iter().enumerate() {
            assert_eq!(report.assets().next().unwrap().position, position);
        }
    }

    #[test]
    fn unsafe_build_id_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let static_dir = root.path().join("static");
        let llm = MockLlmClient::new(&fenced("@startuml\nx\n@enduml"));
        let render = FakeRenderClient::always_png();
        let ingest = RecordingIngestion::default();
        let renderer = DiagramRenderer::new(&llm, &render, &ingest, BASE, &static_dir);
        let specs = vec![DiagramSpec::new("Seq", "flow")];

        let absolute = root.path().join("elsewhere");
        for build_id in ["../outside", "a/b", "", absolute.to_str().unwrap()] {
            let err = renderer.render_all(&specs, build_id).unwrap_err();
            assert!(matches!(err, DiagramError::BuildId(_)), "{build_id}: {err}");
        }
        assert!(!root.path().join("outside").exists());
        assert!(!absolute.exists());
        assert!(llm.prompts().is_empty());
        assert!(ingest.uploads().is_empty());
    }
}
