//! Prompt construction for model-backed summaries

use super::SummaryInput;
use crate::core::limits::{PROMPT_ABSTRACT_CHARS, PROMPT_MAX_PAPERS};
use std::fmt::Write;

pub const SYSTEM_PROMPT: &str = "You are a structural biologist writing for a general audience \
interested in biomedical research. Produce a TLDR of 2-3 sentences that anyone can understand, \
then a detailed summary with inline citations [N] when papers are available. Be precise and \
honest about uncertainty. Define technical terms when first used.";

/// Prompt built from whatever artifacts exist
pub fn build_prompt(input: &SummaryInput<'_>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "## Protein Context");
    let _ = writeln!(out, "- Name: {}", input.protein);
    let _ = writeln!(out, "- Variant: {}", input.variant.unwrap_or("Wild-type"));
    if let Some(rationale) = input.rationale {
        let _ = writeln!(out, "- Rationale: {}", rationale);
    }
    out.push('\n');

    if let Some(conf) = input.confidence {
        let _ = writeln!(out, "## Prediction Confidence");
        let _ = writeln!(out, "- Average pLDDT: {:.1}", conf.mean_plddt);
        let _ = writeln!(out, "- Very high (90-100): {} residues", conf.bands.very_high);
        let _ = writeln!(out, "- Confident (70-90): {} residues", conf.bands.confident);
        let _ = writeln!(out, "- Low (50-70): {} residues", conf.bands.low);
        let _ = writeln!(out, "- Very low (<50): {} residues", conf.bands.very_low);
        let _ = writeln!(
            out,
            "- Destabilized residues: {} ({:.1}%)",
            conf.destabilized_residues, conf.percent_destabilized
        );
        for (i, region) in conf.destabilized_regions.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. Residues {}-{} (avg pLDDT {:.1})",
                i + 1,
                region.start,
                region.end,
                region.mean_plddt
            );
        }
        out.push('\n');
    }

    if let Some(clinical) = input.clinical {
        let _ = writeln!(out, "## Clinical Data");
        if let Some(sig) = &clinical.significance {
            let _ = writeln!(out, "- Clinical significance: {}", sig);
        }
        if let Some(af) = clinical.allele_frequency {
            let _ = writeln!(out, "- Population allele frequency: {:.2e}", af);
        }
        out.push('\n');
    }

    if !input.papers.is_empty() {
        let _ = writeln!(out, "## Literature References");
        let _ = writeln!(out, "Cite relevant papers using [N].\n");
        for (i, paper) in input.papers.iter().take(PROMPT_MAX_PAPERS).enumerate() {
            let year = paper
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "n.d.".to_string());
            let _ = writeln!(
                out,
                "**[{}]** {} et al. ({}). {}. *{}*.",
                i + 1,
                paper.first_author.as_deref().unwrap_or("Unknown"),
                year,
                paper.title,
                paper.journal.as_deref().unwrap_or("")
            );
            if let Some(abstract_text) = paper.abstract_text.as_deref().filter(|a| !a.is_empty()) {
                let _ = writeln!(out, "Abstract: {}", truncate(abstract_text, PROMPT_ABSTRACT_CHARS));
            }
            out.push('\n');
        }
    }

    out.push_str(
        "## Instructions\n\
         Respond with a JSON object with exactly these fields:\n\
         {\"tldr\": \"2-3 sentences, no citations\", \"detailed_summary\": \"3-5 paragraphs with [N] citations\"}\n\
         Respond ONLY with valid JSON.\n",
    );
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
