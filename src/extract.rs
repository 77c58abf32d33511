use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::assemble::Field;
use crate::text::escape;

static REVIEW_LIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#cm_cr-review_list").unwrap());
static PROFILE_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.a-profile-name").unwrap());
static STAR_RATING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"i[data-hook="review-star-rating"] span.a-icon-alt"#).unwrap()
});
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[data-hook="review-title"] > span"#).unwrap());
static DATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.a-size-base.a-color-secondary.review-date").unwrap()
});
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"span[data-hook="review-body"]"#).unwrap());
static HELPFUL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.a-size-base.a-color-tertiary.cr-vote-text").unwrap()
});
static VARIANT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.a-size-mini.a-link-normal.a-color-secondary").unwrap()
});

/// Class of the modal copy of a reviewer profile, which repeats a name
/// already listed on the page.
const LIGHTBOX_PROFILE: &str = "cr-lightbox-customer-profile";

/// Per-field value lists for one page, each in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageColumns {
    pub names: Vec<String>,
    pub stars: Vec<String>,
    pub dates: Vec<String>,
    pub titles: Vec<String>,
    pub reviews: Vec<String>,
    pub helpfuls: Vec<String>,
    pub config_colors: Vec<String>,
}

impl PageColumns {
    pub fn get(&self, field: Field) -> &[String] {
        match field {
            Field::Name => &self.names,
            Field::Stars => &self.stars,
            Field::Date => &self.dates,
            Field::Title => &self.titles,
            Field::Body => &self.reviews,
            Field::Helpful => &self.helpfuls,
            Field::Variant => &self.config_colors,
        }
    }

    fn get_mut(&mut self, field: Field) -> &mut Vec<String> {
        match field {
            Field::Name => &mut self.names,
            Field::Stars => &mut self.stars,
            Field::Date => &mut self.dates,
            Field::Title => &mut self.titles,
            Field::Body => &mut self.reviews,
            Field::Helpful => &mut self.helpfuls,
            Field::Variant => &mut self.config_colors,
        }
    }

    fn push_text(&mut self, field: Field, el: ElementRef<'_>) {
        let text: String = el.text().collect();
        self.get_mut(field).push(escape(&text));
    }
}

/// Extract every review field from a rendered review page.
///
/// Star ratings are read from the whole page, every other field only from
/// the review list container(s). A page with no review list yields nothing.
/// A field with no matches yields an empty list.
pub fn extract_page(html: &str) -> PageColumns {
    let document = Html::parse_document(html);
    extract_document(&document)
}

pub fn extract_document(document: &Html) -> PageColumns {
    let mut columns = PageColumns::default();
    let mut lists = document.select(&REVIEW_LIST).peekable();
    if lists.peek().is_none() {
        return columns;
    }
    // Ratings outside the list (e.g. top reviews) shift the stars column.
    for el in document.select(&STAR_RATING) {
        columns.push_text(Field::Stars, el);
    }
    for list in lists {
        extract_list(list, &mut columns);
    }
    columns
}

fn extract_list(list: ElementRef<'_>, columns: &mut PageColumns) {
    for el in list.select(&PROFILE_NAME) {
        if !is_lightbox_profile(el) {
            columns.push_text(Field::Name, el);
        }
    }

    let fields = [
        (Field::Title, &*TITLE),
        (Field::Date, &*DATE),
        (Field::Body, &*BODY),
        (Field::Helpful, &*HELPFUL),
        (Field::Variant, &*VARIANT),
    ];
    for (field, selector) in fields {
        for el in list.select(selector) {
            columns.push_text(field, el);
        }
    }
}

/// The name span sits two levels below the profile wrapper.
fn is_lightbox_profile(name: ElementRef<'_>) -> bool {
    name.parent()
        .and_then(|p| p.parent())
        .and_then(ElementRef::wrap)
        .is_some_and(|profile| profile.value().classes().any(|c| c == LIGHTBOX_PROFILE))
}
