//! Static wizard configuration: the per-application-type section
//! template, the survey page table, and the required-document catalog.
//! These are code-defined; persisted state is merged into them at load
//! time, never the other way around.

use shared::domain::{ApplicationType, CategoryEntry, CategoryId, Section};

/// The fixed, ordered section set for an application type. Step counts
/// double as stepper segment weights.
pub fn section_template(application_type: ApplicationType) -> Vec<Section> {
    match application_type {
        ApplicationType::Sba => vec![
            Section::new("welcome", "Welcome", 1),
            Section::new("loan-info", "Loan Information", 2),
            Section::new("business-info", "Business Info", 3),
            Section::new("owner-info", "Owner Information", 2),
            Section::new("certification", "Certification", 1),
            Section::new("pre-screen", "Pre-Screen Questions", 2),
            Section::new("documents", "Documents", 2),
            Section::new("review", "Review", 1),
        ],
    }
}

/// One survey page as known to the external page-rendering engine,
/// mapped onto its owning section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    pub name: &'static str,
    pub section_index: usize,
    pub section_id: &'static str,
    pub title: &'static str,
}

/// Survey page order matches the engine's page indices.
pub const SURVEY_PAGES: &[PageConfig] = &[
    PageConfig {
        name: "welcome",
        section_index: 0,
        section_id: "welcome",
        title: "Welcome",
    },
    PageConfig {
        name: "loan-information",
        section_index: 1,
        section_id: "loan-info",
        title: "Loan Information",
    },
    PageConfig {
        name: "business-info",
        section_index: 2,
        section_id: "business-info",
        title: "Business Information",
    },
    PageConfig {
        name: "owner-information",
        section_index: 3,
        section_id: "owner-info",
        title: "Owner Information",
    },
    PageConfig {
        name: "certification",
        section_index: 4,
        section_id: "certification",
        title: "Certification",
    },
    PageConfig {
        name: "pre-screen-questions",
        section_index: 5,
        section_id: "pre-screen",
        title: "Pre-Screen Questions",
    },
    PageConfig {
        name: "document-collection",
        section_index: 6,
        section_id: "documents",
        title: "Document Collection",
    },
    PageConfig {
        name: "review",
        section_index: 7,
        section_id: "review",
        title: "Review Application",
    },
];

pub fn page_config(page_name: &str) -> Option<&'static PageConfig> {
    SURVEY_PAGES.iter().find(|page| page.name == page_name)
}

/// Engine page index for a page name. Unknown names resolve to `None`;
/// callers driven by untrusted URL input fall back to the first page.
pub fn page_index(page_name: &str) -> Option<usize> {
    SURVEY_PAGES.iter().position(|page| page.name == page_name)
}

/// Section index for a page name, falling back to the first section.
pub fn section_index_for_page(page_name: &str) -> usize {
    page_config(page_name)
        .map(|page| page.section_index)
        .unwrap_or(0)
}

fn category(
    id: &str,
    title: &str,
    subtitle: &str,
    description: &str,
) -> CategoryEntry {
    CategoryEntry {
        id: CategoryId::new(id),
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        description: description.to_string(),
    }
}

/// The fixed SBA required-document catalog. One entry per
/// required-document type; shared read-only across applications.
pub fn document_catalog() -> Vec<CategoryEntry> {
    vec![
        category(
            "balance-sheet",
            "Business Balance Sheet",
            "(Interim/YE)",
            "Most recent interim and year-end balance sheets.",
        ),
        category(
            "debt-schedule",
            "Business Debt Schedule",
            "",
            "Schedule of all outstanding business debt.",
        ),
        category(
            "profit-loss",
            "Business Profit & Loss",
            "(Interim/YE)",
            "Most recent interim and year-end profit and loss statements.",
        ),
        category(
            "business-tax-returns",
            "Business Tax Returns",
            "(BTR)",
            "Federal business tax returns for the last three years.",
        ),
        category(
            "personal-tax-returns",
            "Personal Tax Returns",
            "(PTR)",
            "Federal personal tax returns for the last three years.",
        ),
        category(
            "project-costs",
            "Project Costs Documents",
            "Working Capital/Start-Up Costs",
            "Supporting documents for project costs and use of proceeds.",
        ),
        category(
            "personal-financial-statement",
            "SBA Form 413 Personal",
            "Financial Statement (PFS)",
            "Completed SBA Form 413 for each owner of 20% or more.",
        ),
    ]
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
