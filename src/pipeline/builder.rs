/*!
 * Pipeline Builder
 * Assembles a FoldPipeline from its backend, sensors and collaborators
 */

use super::driver::FoldPipeline;
use super::types::PipelineSettings;
use crate::backend::{self, FoldBackend};
use crate::collaborators::{
    ClinicalSource, CommandClinicalSource, CommandLiterature, CommandSequenceLookup,
    ConfidenceAnalyzer, LiteratureSource, SequenceLookup, StructureAnalyzer,
};
use crate::config::Config;
use crate::monitoring::{MeminfoMonitor, ResourceMonitor};
use crate::process::{ProcessSupervisor, ProcfsTable, StaleProcessReaper};
use crate::summary::{self, Summarizer};
use std::sync::Arc;

pub struct FoldPipelineBuilder {
    settings: PipelineSettings,
    backend: Arc<dyn FoldBackend>,
    monitor: Option<Arc<dyn ResourceMonitor>>,
    supervisor: Option<Arc<ProcessSupervisor>>,
    reaper: Option<Arc<StaleProcessReaper>>,
    sequence_lookup: Option<Arc<dyn SequenceLookup>>,
    analyzer: Option<Arc<dyn StructureAnalyzer>>,
    clinical: Option<Arc<dyn ClinicalSource>>,
    literature: Option<Arc<dyn LiteratureSource>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl FoldPipelineBuilder {
    pub fn new(settings: PipelineSettings, backend: Arc<dyn FoldBackend>) -> Self {
        Self {
            settings,
            backend,
            monitor: None,
            supervisor: None,
            reaper: None,
            sequence_lookup: None,
            analyzer: None,
            clinical: None,
            literature: None,
            summarizer: None,
        }
    }

    /// Memory sensor (default: /proc/meminfo)
    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Supervisor that launches the backend (default: procfs table)
    pub fn with_supervisor(mut self, supervisor: Arc<ProcessSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Reaper used before the fold and on preflight rejection
    pub fn with_reaper(mut self, reaper: Arc<StaleProcessReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    pub fn with_sequence_lookup(mut self, lookup: Arc<dyn SequenceLookup>) -> Self {
        self.sequence_lookup = Some(lookup);
        self
    }

    /// Structure analyzer (default: built-in confidence analyzer)
    pub fn with_analyzer(mut self, analyzer: Arc<dyn StructureAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_clinical(mut self, source: Arc<dyn ClinicalSource>) -> Self {
        self.clinical = Some(source);
        self
    }

    pub fn with_literature(mut self, source: Arc<dyn LiteratureSource>) -> Self {
        self.literature = Some(source);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn build(self) -> FoldPipeline {
        let supervisor = self
            .supervisor
            .unwrap_or_else(|| Arc::new(ProcessSupervisor::new(Arc::new(ProcfsTable::new()))));
        FoldPipeline {
            settings: self.settings,
            backend: self.backend,
            monitor: self
                .monitor
                .unwrap_or_else(|| Arc::new(MeminfoMonitor::new())),
            supervisor,
            reaper: self.reaper,
            sequence_lookup: self.sequence_lookup,
            analyzer: self
                .analyzer
                .unwrap_or_else(|| Arc::new(ConfidenceAnalyzer::new())),
            clinical: self.clinical,
            literature: self.literature,
            summarizer: self.summarizer,
        }
    }
}

impl FoldPipeline {
    pub fn builder(settings: PipelineSettings, backend: Arc<dyn FoldBackend>) -> FoldPipelineBuilder {
        FoldPipelineBuilder::new(settings, backend)
    }

    /// Wire the pipeline exactly as the configuration describes it
    pub fn from_config(config: &Config) -> Self {
        let backend = backend::from_config(&config.folding);
        let table = Arc::new(ProcfsTable::new());
        let supervisor = Arc::new(
            ProcessSupervisor::new(table.clone()).with_grace(config.terminate_grace()),
        );
        let reaper = Arc::new(
            StaleProcessReaper::new(table, backend.signatures())
                .with_grace(config.terminate_grace())
                .with_active_groups(supervisor.active_groups()),
        );

        let collab = &config.collaborators;
        let mut builder = FoldPipeline::builder(PipelineSettings::from(config), backend)
            .with_supervisor(supervisor)
            .with_reaper(reaper);
        if let Some(spec) = &collab.sequence {
            builder = builder.with_sequence_lookup(Arc::new(CommandSequenceLookup::new(spec.clone())));
        }
        if let Some(spec) = &collab.clinical {
            builder = builder.with_clinical(Arc::new(CommandClinicalSource::new(spec.clone())));
        }
        if let Some(spec) = &collab.literature {
            builder = builder.with_literature(Arc::new(CommandLiterature::new(
                spec.clone(),
                collab.max_papers,
            )));
        }
        if let Some(summarizer) = summary::from_config(&config.summary) {
            builder = builder.with_summarizer(summarizer);
        }
        builder.build()
    }
}
