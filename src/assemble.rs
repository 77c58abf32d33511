use crate::error::ScrapeError;
use crate::extract::PageColumns;
use crate::item::Item;

/// Persisted column order: the four item constants, then one column per field.
pub const COLUMN_NAMES: [&str; 11] = [
    "product_name",
    "base_price",
    "config_price",
    "bundle_price",
    "names",
    "stars",
    "dates",
    "titles",
    "reviews",
    "helpfuls",
    "config_color",
];

/// Review fields scraped as independent per-page lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Stars,
    Date,
    Title,
    Body,
    Helpful,
    Variant,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Name,
        Field::Stars,
        Field::Date,
        Field::Title,
        Field::Body,
        Field::Helpful,
        Field::Variant,
    ];

    pub fn column_name(self) -> &'static str {
        COLUMN_NAMES[4 + self as usize]
    }
}

/// Item-level values repeated on every row.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemConstants {
    pub name: String,
    pub base_price: Option<f64>,
    pub config_price: Option<f64>,
    pub bundle_price: Option<f64>,
}

impl From<&Item> for ItemConstants {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            base_price: item.base_price,
            config_price: item.config_price,
            bundle_price: item.bundle_price,
        }
    }
}

/// Everything extracted from one page plus the item it belongs to.
///
/// Columns line up by position only: entry `i` of one column and entry `i`
/// of another describe the same review only if the page rendered every field
/// for every review before it.
#[derive(Debug, Clone)]
pub struct ColumnBundle {
    pub url: String,
    pub item: ItemConstants,
    pub columns: PageColumns,
}

impl ColumnBundle {
    pub fn new(url: impl Into<String>, item: ItemConstants, columns: PageColumns) -> Self {
        Self {
            url: url.into(),
            item,
            columns,
        }
    }

    pub fn column_lengths(&self) -> Vec<(Field, usize)> {
        Field::ALL
            .iter()
            .map(|&f| (f, self.columns.get(f).len()))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        Field::ALL
            .iter()
            .map(|&f| self.columns.get(f).len())
            .max()
            .unwrap_or(0)
    }

    /// True when the field lists disagree in length, i.e. rows past the
    /// shortest column carry missing values and may be misaligned.
    pub fn is_ragged(&self) -> bool {
        let row_count = self.row_count();
        Field::ALL
            .iter()
            .any(|&f| self.columns.get(f).len() != row_count)
    }
}

/// One output row. Fields absent from a ragged column are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub item: ItemConstants,
    pub name: Option<String>,
    pub stars: Option<String>,
    pub date: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub helpful: Option<String>,
    pub variant: Option<String>,
}

impl ReviewRow {
    pub fn field(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::Name => &self.name,
            Field::Stars => &self.stars,
            Field::Date => &self.date,
            Field::Title => &self.title,
            Field::Body => &self.body,
            Field::Helpful => &self.helpful,
            Field::Variant => &self.variant,
        };
        value.as_deref()
    }

    /// Values in `COLUMN_NAMES` order, with missing values as empty strings.
    pub fn to_record(&self) -> Vec<String> {
        // Debug keeps the trailing ".0" on whole prices.
        let price = |p: Option<f64>| p.map(|v| format!("{v:?}")).unwrap_or_default();
        let mut record = vec![
            self.item.name.clone(),
            price(self.item.base_price),
            price(self.item.config_price),
            price(self.item.bundle_price),
        ];
        record.extend(
            Field::ALL
                .iter()
                .map(|&f| self.field(f).unwrap_or_default().to_string()),
        );
        record
    }
}

/// Zip the page's columns into rows, padding short columns with `None`.
///
/// Row count is the longest column. A page where every column is empty is an
/// `EmptyPage` error.
pub fn assemble(bundle: &ColumnBundle) -> Result<Vec<ReviewRow>, ScrapeError> {
    let row_count = bundle.row_count();
    if row_count == 0 {
        return Err(ScrapeError::EmptyPage {
            url: bundle.url.clone(),
        });
    }

    let cell = |field: Field, idx: usize| bundle.columns.get(field).get(idx).cloned();

    let rows = (0..row_count)
        .map(|i| ReviewRow {
            item: bundle.item.clone(),
            name: cell(Field::Name, i),
            stars: cell(Field::Stars, i),
            date: cell(Field::Date, i),
            title: cell(Field::Title, i),
            body: cell(Field::Body, i),
            helpful: cell(Field::Helpful, i),
            variant: cell(Field::Variant, i),
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> ItemConstants {
        ItemConstants {
            name: "Echo_Dot_3rd_Gen_2018_Charcoal".into(),
            base_price: Some(22.92),
            config_price: Some(15.06),
            bundle_price: None,
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn bundle(columns: PageColumns) -> ColumnBundle {
        ColumnBundle::new("https://example.test/p1", constants(), columns)
    }

    #[test]
    fn ragged_columns_pad_with_none() {
        let mut columns = PageColumns::default();
        columns.names = strings(&["a", "b", "c"]);
        columns.helpfuls = strings(&["3 people found this helpful"]);
        let bundle = bundle(columns);
        assert!(bundle.is_ragged());

        let rows = assemble(&bundle).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].helpful.as_deref(), Some("3 people found this helpful"));
        assert_eq!(rows[1].helpful, None);
        assert_eq!(rows[2].helpful, None);
        assert!(rows.iter().all(|r| r.date.is_none()));
        assert_eq!(rows[2].name.as_deref(), Some("c"));
    }

    #[test]
    fn every_row_repeats_item_constants() {
        let mut columns = PageColumns::default();
        columns.titles = strings(&["t1", "t2"]);
        let rows = assemble(&bundle(columns)).unwrap();
        assert!(rows.iter().all(|r| r.item == constants()));
    }

    #[test]
    fn all_empty_columns_is_empty_page() {
        let err = assemble(&bundle(PageColumns::default())).unwrap_err();
        assert!(matches!(err, ScrapeError::EmptyPage { ref url } if url == "https://example.test/p1"));
    }

    #[test]
    fn positional_alignment_shifts_when_a_middle_review_lacks_a_field() {
        // Second review has no variant, third does: its variant lands on row 1.
        let mut columns = PageColumns::default();
        columns.names = strings(&["first", "second", "third"]);
        columns.config_colors = strings(&["Color: Blue", "Color: White"]);
        let rows = assemble(&bundle(columns)).unwrap();
        assert_eq!(rows[1].name.as_deref(), Some("second"));
        assert_eq!(rows[1].variant.as_deref(), Some("Color: White"));
        assert_eq!(rows[2].variant, None);
    }

    #[test]
    fn record_follows_column_order() {
        let mut columns = PageColumns::default();
        columns.names = strings(&["Sam"]);
        columns.stars = strings(&["2.0 out of 5 stars"]);
        columns.reviews = strings(&["meh"]);
        let rows = assemble(&bundle(columns)).unwrap();
        assert_eq!(
            rows[0].to_record(),
            strings(&[
                "Echo_Dot_3rd_Gen_2018_Charcoal",
                "22.92",
                "15.06",
                "",
                "Sam",
                "2.0 out of 5 stars",
                "",
                "",
                "meh",
                "",
                "",
            ])
        );
        assert_eq!(Field::Variant.column_name(), "config_color");
        assert_eq!(Field::Name.column_name(), "names");
    }

    #[test]
    fn whole_prices_keep_decimal_point() {
        let mut columns = PageColumns::default();
        columns.names = strings(&["Sam"]);
        let mut page = bundle(columns);
        page.item.base_price = Some(15.0);
        page.item.bundle_price = Some(49.99);
        let record = assemble(&page).unwrap()[0].to_record();
        assert_eq!(&record[1..4], &strings(&["15.0", "15.06", "49.99"])[..]);
    }
}
