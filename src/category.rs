//! The category catalog and the rules for which categories suit which transaction type.
//!
//! Rules are keyed by category name, so adding a category to the catalog is a
//! data change only.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
    sync::LazyLock,
};

use serde::{Deserialize, Serialize};

use crate::{Error, transaction::TransactionType};

/// The catch-all category used when a category has no definition.
pub const OTHER_CATEGORY: &str = "Other";

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// Leading and trailing whitespace is removed.
    ///
    /// # Errors
    ///
    /// This function will return an error if `name` is empty or only whitespace.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            Err(Error::EmptyCategoryName)
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the non-empty invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a category is displayed. `color` and `icon` are opaque display tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryDefinition {
    /// The unique name of the category.
    pub name: CategoryName,
    /// A display color, e.g. "#6366F1".
    pub color: String,
    /// An icon name, e.g. "cutlery".
    pub icon: String,
}

impl CategoryDefinition {
    /// Create a category definition.
    pub fn new(name: CategoryName, color: &str, icon: &str) -> Self {
        Self {
            name,
            color: color.to_owned(),
            icon: icon.to_owned(),
        }
    }
}

static UNKNOWN_CATEGORY: LazyLock<CategoryDefinition> = LazyLock::new(|| {
    CategoryDefinition::new(
        CategoryName::new_unchecked(OTHER_CATEGORY),
        "#818CF8",
        "ellipsis-h",
    )
});

/// The ordered set of known categories plus the type/category pairing rules.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCatalog {
    definitions: Vec<CategoryDefinition>,
    index: HashMap<String, usize>,
    forbidden_as_expense: BTreeSet<String>,
    forbidden_as_income: BTreeSet<String>,
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::reference()
    }
}

impl CategoryCatalog {
    /// Create a catalog with no categories and no rules.
    pub fn empty() -> Self {
        Self {
            definitions: Vec::new(),
            index: HashMap::new(),
            forbidden_as_expense: BTreeSet::new(),
            forbidden_as_income: BTreeSet::new(),
        }
    }

    /// The catalog the app ships with.
    ///
    /// "Salary" may only be income, while "Food", "Transport" and "Shopping"
    /// may only be expenses.
    pub fn reference() -> Self {
        let mut catalog = Self::empty();

        for (name, color, icon) in [
            ("Food", "#6366F1", "cutlery"),
            ("Transport", "#3B82F6", "bus"),
            ("Shopping", "#9333EA", "shopping-bag"),
            ("Salary", "#22c55e", "money"),
            (OTHER_CATEGORY, "#818CF8", "ellipsis-h"),
        ] {
            catalog.push(CategoryDefinition::new(
                CategoryName::new_unchecked(name),
                color,
                icon,
            ));
        }

        catalog.forbid_as_expense("Salary");
        catalog.forbid_as_income("Food");
        catalog.forbid_as_income("Transport");
        catalog.forbid_as_income("Shopping");

        catalog
    }

    /// Parse a catalog from JSON.
    ///
    /// The JSON object holds a `categories` array of `{name, color, icon}`
    /// objects and optional `forbidden_as_expense` and `forbidden_as_income`
    /// arrays of category names.
    ///
    /// # Errors
    /// Returns an [Error::InvalidCatalog] if the JSON is malformed, or the
    /// errors of [CategoryCatalog::add_category] for bad category names.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|error| Error::InvalidCatalog(error.to_string()))?;

        let mut catalog = Self::empty();

        for category in file.categories {
            let name = CategoryName::new(&category.name)?;
            catalog.add_category(CategoryDefinition::new(name, &category.color, &category.icon))?;
        }

        for name in &file.forbidden_as_expense {
            catalog.forbid_as_expense(name);
        }

        for name in &file.forbidden_as_income {
            catalog.forbid_as_income(name);
        }

        Ok(catalog)
    }

    /// Append a category to the catalog.
    ///
    /// # Errors
    /// Returns an [Error::DuplicateCategoryName] if a category with the same
    /// name already exists.
    pub fn add_category(&mut self, definition: CategoryDefinition) -> Result<(), Error> {
        if self.index.contains_key(definition.name.as_ref()) {
            return Err(Error::DuplicateCategoryName(definition.name.to_string()));
        }

        self.push(definition);
        Ok(())
    }

    fn push(&mut self, definition: CategoryDefinition) {
        self.index
            .insert(definition.name.to_string(), self.definitions.len());
        self.definitions.push(definition);
    }

    /// Forbid tagging expenses with `category`.
    pub fn forbid_as_expense(&mut self, category: &str) {
        self.forbidden_as_expense.insert(category.to_owned());
    }

    /// Forbid tagging income with `category`.
    pub fn forbid_as_income(&mut self, category: &str) {
        self.forbidden_as_income.insert(category.to_owned());
    }

    /// The categories in display order.
    pub fn definitions(&self) -> &[CategoryDefinition] {
        &self.definitions
    }

    /// The definition for `name`, if the category is in the catalog.
    pub fn definition(&self, name: &str) -> Option<&CategoryDefinition> {
        self.index.get(name).map(|&position| &self.definitions[position])
    }

    /// The definition to display for `name`.
    ///
    /// Categories missing from the catalog are displayed as "Other".
    pub fn display_definition(&self, name: &str) -> &CategoryDefinition {
        self.definition(name)
            .or_else(|| self.definition(OTHER_CATEGORY))
            .unwrap_or(&*UNKNOWN_CATEGORY)
    }

    /// Whether `name` is in the catalog.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Categories that must never be tagged as an expense.
    pub fn forbidden_as_expense(&self) -> &BTreeSet<String> {
        &self.forbidden_as_expense
    }

    /// Categories that must never be tagged as income.
    pub fn forbidden_as_income(&self) -> &BTreeSet<String> {
        &self.forbidden_as_income
    }

    /// Whether a transaction of `type_` may be tagged with `category`.
    pub fn is_allowed(&self, type_: TransactionType, category: &str) -> bool {
        match type_ {
            TransactionType::Expense => !self.forbidden_as_expense.contains(category),
            TransactionType::Income => !self.forbidden_as_income.contains(category),
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    categories: Vec<CatalogFileCategory>,
    #[serde(default)]
    forbidden_as_expense: Vec<String>,
    #[serde(default)]
    forbidden_as_income: Vec<String>,
}

#[derive(Deserialize)]
struct CatalogFileCategory {
    name: String,
    color: String,
    icon: String,
}

#[cfg(test)]
mod category_name_tests {
    use crate::{Error, category::CategoryName};

    #[test]
    fn new_fails_on_empty_string() {
        let category_name = CategoryName::new("");

        assert_eq!(category_name, Err(Error::EmptyCategoryName));
    }

    #[test]
    fn new_fails_on_whitespace() {
        let category_name = CategoryName::new("  \t");

        assert_eq!(category_name, Err(Error::EmptyCategoryName));
    }

    #[test]
    fn new_succeeds_on_non_empty_string() {
        let category_name = CategoryName::new("🔥");

        assert!(category_name.is_ok())
    }

    #[test]
    fn new_trims_whitespace() {
        let category_name = CategoryName::new(" Rent ").unwrap();

        assert_eq!(category_name.as_ref(), "Rent");
    }
}

#[cfg(test)]
mod catalog_tests {
    use crate::{
        Error,
        category::{CategoryCatalog, CategoryDefinition, CategoryName, OTHER_CATEGORY},
        transaction::TransactionType,
    };

    #[test]
    fn reference_catalog_order() {
        let catalog = CategoryCatalog::reference();

        let names: Vec<&str> = catalog
            .definitions()
            .iter()
            .map(|definition| definition.name.as_ref())
            .collect();

        assert_eq!(names, ["Food", "Transport", "Shopping", "Salary", "Other"]);
    }

    #[test]
    fn forbidden_pairs_are_rejected() {
        let catalog = CategoryCatalog::reference();

        assert!(!catalog.is_allowed(TransactionType::Expense, "Salary"));
        for category in ["Food", "Transport", "Shopping"] {
            assert!(
                !catalog.is_allowed(TransactionType::Income, category),
                "want {category} to be forbidden as income"
            );
        }
    }

    #[test]
    fn other_pairs_are_allowed() {
        let catalog = CategoryCatalog::reference();

        for category in ["Food", "Transport", "Shopping", "Other", "Gifts"] {
            assert!(catalog.is_allowed(TransactionType::Expense, category));
        }
        for category in ["Salary", "Other", "Gifts"] {
            assert!(catalog.is_allowed(TransactionType::Income, category));
        }
    }

    #[test]
    fn added_category_is_found_without_rule_changes() {
        let mut catalog = CategoryCatalog::reference();

        catalog
            .add_category(CategoryDefinition::new(
                CategoryName::new("Rent").unwrap(),
                "#F43F5E",
                "home",
            ))
            .unwrap();

        assert_eq!(catalog.definition("Rent").unwrap().icon, "home");
        assert_eq!(catalog.definitions().last().unwrap().name.as_ref(), "Rent");
        assert!(catalog.is_allowed(TransactionType::Expense, "Rent"));
        assert!(catalog.is_allowed(TransactionType::Income, "Rent"));
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let mut catalog = CategoryCatalog::reference();

        let got = catalog.add_category(CategoryDefinition::new(
            CategoryName::new("Food").unwrap(),
            "#000000",
            "cutlery",
        ));

        assert_eq!(got, Err(Error::DuplicateCategoryName("Food".to_owned())));
        assert_eq!(catalog.definitions().len(), 5);
    }

    #[test]
    fn unknown_category_displays_as_other() {
        let catalog = CategoryCatalog::reference();

        let got = catalog.display_definition("Gifts");

        assert_eq!(got.name.as_ref(), OTHER_CATEGORY);
        assert_eq!(got.icon, "ellipsis-h");
    }

    #[test]
    fn unknown_category_without_other_uses_builtin_fallback() {
        let catalog = CategoryCatalog::empty();

        let got = catalog.display_definition("Gifts");

        assert_eq!(got.name.as_ref(), OTHER_CATEGORY);
    }

    #[test]
    fn from_json_builds_catalog_and_rules() {
        let json = r##"{
            "categories": [
                {"name": "Rent", "color": "#F43F5E", "icon": "home"},
                {"name": "Wages", "color": "#22c55e", "icon": "money"}
            ],
            "forbidden_as_expense": ["Wages"],
            "forbidden_as_income": ["Rent"]
        }"##;

        let catalog = CategoryCatalog::from_json(json).unwrap();

        assert_eq!(catalog.definitions().len(), 2);
        assert!(!catalog.is_allowed(TransactionType::Expense, "Wages"));
        assert!(!catalog.is_allowed(TransactionType::Income, "Rent"));
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        let got = CategoryCatalog::from_json("{\"categories\": 3}");

        assert!(matches!(got, Err(Error::InvalidCatalog(_))));
    }

    #[test]
    fn from_json_rejects_empty_names() {
        let json = r#"{"categories": [{"name": " ", "color": "", "icon": ""}]}"#;

        assert_eq!(
            CategoryCatalog::from_json(json),
            Err(Error::EmptyCategoryName)
        );
    }
}
