/*!
 * Template Summarizer
 * Offline summary assembled from the run's artifacts
 */

use super::{SummaryDocument, SummaryInput, Summarizer};
use crate::collaborators::CollabResult;
use async_trait::async_trait;
use std::fmt::Write;

#[derive(Debug, Clone, Default)]
pub struct TemplateSummarizer;

impl TemplateSummarizer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &SummaryInput<'_>) -> SummaryDocument {
        let subject = match input.variant {
            Some(variant) => format!("{} {}", input.protein, variant),
            None => format!("{} (wild-type)", input.protein),
        };

        let tldr = match input.confidence {
            Some(conf) => format!(
                "Predicted structure of {} with average pLDDT {:.1}; {:.1}% of residues fall below 70.",
                subject, conf.mean_plddt, conf.percent_destabilized
            ),
            None if input.structure.is_some() => {
                format!("Predicted structure of {}; no confidence scores were available.", subject)
            }
            None => format!("No structure was produced for {}.", subject),
        };

        let mut body = String::new();
        if let Some(rationale) = input.rationale {
            let _ = writeln!(body, "**Rationale:** {}\n", rationale);
        }
        if let Some(structure) = input.structure {
            let _ = writeln!(body, "## Structure\n\nModel: `{}`\n", structure.pdb.display());
        }
        if let Some(conf) = input.confidence {
            let _ = writeln!(body, "## Confidence\n");
            let _ = writeln!(body, "| Band | Residues |\n|---|---|");
            let _ = writeln!(body, "| Very high (>=90) | {} |", conf.bands.very_high);
            let _ = writeln!(body, "| Confident (70-90) | {} |", conf.bands.confident);
            let _ = writeln!(body, "| Low (50-70) | {} |", conf.bands.low);
            let _ = writeln!(body, "| Very low (<50) | {} |\n", conf.bands.very_low);
            if !conf.destabilized_regions.is_empty() {
                let _ = writeln!(body, "Low-confidence regions:\n");
                for region in &conf.destabilized_regions {
                    let _ = writeln!(
                        body,
                        "- residues {}-{} (mean pLDDT {:.1})",
                        region.start, region.end, region.mean_plddt
                    );
                }
                body.push('\n');
            }
        }
        if let Some(clinical) = input.clinical {
            let _ = writeln!(body, "## Clinical\n");
            let _ = writeln!(
                body,
                "- Significance: {}",
                clinical.significance.as_deref().unwrap_or("no entry")
            );
            match clinical.allele_frequency {
                Some(af) => {
                    let _ = writeln!(body, "- Allele frequency: {:.2e}\n", af);
                }
                None => body.push_str("- Allele frequency: not observed\n\n"),
            }
        }
        if !input.papers.is_empty() {
            let _ = writeln!(body, "## Related papers\n");
            for (i, paper) in input.papers.iter().enumerate() {
                let year = paper.year.map(|y| format!(" ({})", y)).unwrap_or_default();
                let _ = writeln!(body, "{}. {}{}", i + 1, paper.title, year);
            }
        }

        SummaryDocument {
            tldr,
            body,
            generator: self.name().to_string(),
        }
    }
}

#[async_trait]
impl Summarizer for TemplateSummarizer {
    fn name(&self) -> &str {
        "template"
    }

    async fn summarize(&self, input: &SummaryInput<'_>) -> CollabResult<SummaryDocument> {
        Ok(self.render(input))
    }
}
