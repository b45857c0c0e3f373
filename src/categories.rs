//! Category taxonomy
//!
//! The folder list is data, not code: the defaults below can be replaced from
//! the config file. Unknown folder names coming back from the classifier fall
//! back to [`MISC`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Fallback category for anything the classifier cannot place
pub const MISC: &str = "misc";

/// Output folder for files that failed extraction or classification
pub const UNSUPPORTED: &str = "unsupported";

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("medical", "Medical documents, prescriptions, treatment records"),
    ("financial", "Bank statements, invoices, payments, transfers"),
    ("travel", "Travel itineraries, tickets, and reservations"),
    ("personal", "Personal documents and private files"),
    ("technical", "Technical documentation and manuals"),
    ("car", "Car related documents, tickets, fines, insurance"),
    ("home", "Mortgage, rent, utilities, and home insurance"),
    ("receipts", "Purchase receipts and invoices"),
    ("work", "Employment contracts, pay slips, work-related documents"),
    ("education", "School records, diplomas, certificates, transcripts, school forms"),
    ("tax", "Tax returns, tax-related documents"),
    ("government-it", "Italian Government-issued documents, IDs, passports"),
    ("government-tr", "Turkish Government-issued documents, IDs, passports"),
    ("government-us", "USA Government-issued documents, IDs, passports"),
    (
        "visa-immigration",
        "Any visa/immigration related document that doesn't fall under the government-XX folders",
    ),
    (MISC, "Miscellaneous uncategorized documents"),
];

/// A single output category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The ordered set of categories the classifier may choose from
#[derive(Debug, Clone)]
pub struct CategorySet {
    categories: Vec<Category>,
}

impl CategorySet {
    /// Build a set from configured categories.
    ///
    /// `misc` is appended when missing; `unsupported` is rejected since it
    /// names the holding area.
    pub fn new(categories: Vec<Category>) -> Result<Self, ConfigError> {
        let mut unique: Vec<Category> = Vec::with_capacity(categories.len() + 1);
        for category in categories {
            let name = category.name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            if name == UNSUPPORTED {
                return Err(ConfigError::ReservedCategory(name));
            }
            if name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(ConfigError::InvalidCategory(name));
            }
            if unique.iter().any(|c| c.name == name) {
                continue;
            }
            unique.push(Category {
                name,
                description: category.description,
            });
        }

        if !unique.iter().any(|c| c.name == MISC) {
            unique.push(Category {
                name: MISC.to_string(),
                description: "Miscellaneous uncategorized documents".to_string(),
            });
        }

        Ok(Self { categories: unique })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.name == name)
    }

    /// Map a classifier-supplied folder onto a known category, falling back to `misc`.
    pub fn resolve(&self, folder: &str) -> &Category {
        let wanted = folder.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.name == wanted)
            .or_else(|| self.categories.iter().find(|c| c.name == MISC))
            .unwrap_or(&self.categories[0])
    }

    /// Folder listing embedded in the classification prompt
    pub fn prompt_listing(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("    {}/\n    - {}\n", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|(name, description)| Category {
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        }
    }
}
