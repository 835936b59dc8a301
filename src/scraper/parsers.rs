use crate::models::{CardTweet, Extraction, HandleMapping};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::cleaner::{handle_from_profile_href, id_from_figure_href, stripped_text};

const GRID: &str = "div.grid";
const TWEET_CARD: &str = "a.box.tweet-card";
const FIGURE_CARD: &str = "a.box.figure-card";
const NEXT_LINK: &str = "a.pagination-next:not([disabled]):not(.is-disabled)";

/// What one listing page yielded, before the driver decides what to do next.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage<T> {
    pub items: Extraction<T>,
    pub next: Option<String>,
}

fn sel(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("selector '{}': {:?}", s, e))
}

fn text_of(el: &ElementRef<'_>) -> String {
    stripped_text(el.text())
}

// ── Listing container ─────────────────────────────────────────────────────────

/// Cards inside the listing grid. `None` when the grid is missing or holds no card.
fn listing_cards<'a>(doc: &'a Html, card_selector: &str) -> Result<Option<Vec<ElementRef<'a>>>> {
    let grid_sel = sel(GRID)?;
    let Some(grid) = doc.select(&grid_sel).next() else {
        warn!("Could not find the listing grid on page");
        return Ok(None);
    };

    let card_sel = sel(card_selector)?;
    let cards: Vec<ElementRef<'a>> = grid.select(&card_sel).collect();
    if cards.is_empty() {
        warn!("Could not find any '{}' cards on the grid", card_selector);
        return Ok(None);
    }

    Ok(Some(cards))
}

/// Relative link behind an enabled `Next` control, if the page has one.
pub fn next_page_ref(doc: &Html) -> Result<Option<String>> {
    let next_sel = sel(NEXT_LINK)?;
    Ok(doc
        .select(&next_sel)
        .find(|a| text_of(a) == "Next")
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string))
}

// ── Tweet cards ───────────────────────────────────────────────────────────────

pub fn extract_tweet_cards(doc: &Html) -> Result<Extraction<CardTweet>> {
    let Some(cards) = listing_cards(doc, TWEET_CARD)? else {
        return Ok(Extraction::NotFound);
    };

    let span = sel("span")?;
    let linked_span = sel("span[href]")?;
    let block = sel("p")?;
    let strong = sel("strong")?;

    let tweets = cards
        .iter()
        .map(|card| {
            let spans: Vec<ElementRef<'_>> = card.select(&span).collect();

            let mut tweet = CardTweet {
                tweeted_at: spans
                    .iter()
                    .map(text_of)
                    .find(|t| t.starts_with("Posted")),
                user_handle: card.select(&linked_span).next().map(|s| text_of(&s)),
                is_retweet: spans.iter().any(|s| text_of(s) == "Retweet"),
                ..Default::default()
            };

            // Exactly two <p>: display name, then message. Any other layout is unknown.
            let blocks: Vec<ElementRef<'_>> = card.select(&block).collect();
            if let [name_block, body_block] = blocks.as_slice() {
                tweet.username = name_block.select(&strong).next().map(|s| text_of(&s));
                tweet.text = Some(text_without_first_span(body_block, &span));
            } else {
                debug!("Tweet card with {} text blocks, leaving text empty", blocks.len());
            }

            tweet
        })
        .collect();

    Ok(Extraction::Found(tweets))
}

/// Text of `block` with its first nested `<span>` (embedded metadata) left out.
fn text_without_first_span(block: &ElementRef<'_>, span: &Selector) -> String {
    let Some(skipped) = block.select(span).next() else {
        return text_of(block);
    };

    stripped_text(block.descendants().filter_map(|node| {
        if node.ancestors().any(|a| a == *skipped) || node == *skipped {
            return None;
        }
        node.value().as_text().map(|t| &**t)
    }))
}

/// Links of every tweet card, for fetching each tweet in its raw form.
pub fn extract_tweet_links(doc: &Html) -> Result<Extraction<String>> {
    let Some(cards) = listing_cards(doc, TWEET_CARD)? else {
        return Ok(Extraction::NotFound);
    };

    let links = cards
        .iter()
        .filter_map(|card| {
            let href = card.value().attr("href");
            if href.is_none() {
                debug!("Tweet card without href, skipping");
            }
            href.map(str::to_string)
        })
        .collect();

    Ok(Extraction::Found(links))
}

// ── Figure cards ──────────────────────────────────────────────────────────────

/// Every (handle, id) pair advertised by the figure cards on a search page.
pub fn extract_figure_cards(doc: &Html) -> Result<Extraction<HandleMapping>> {
    let Some(cards) = listing_cards(doc, FIGURE_CARD)? else {
        return Ok(Extraction::NotFound);
    };

    let linked_span = sel("span[href]")?;

    let figures = cards
        .iter()
        .filter_map(|card| {
            let profile = card
                .select(&linked_span)
                .next()
                .and_then(|s| s.value().attr("href"))?;
            let own = card.value().attr("href")?;

            Some(HandleMapping {
                id: id_from_figure_href(own).to_string(),
                handle: handle_from_profile_href(profile).to_string(),
            })
        })
        .collect();

    Ok(Extraction::Found(figures))
}

// ── Whole pages ───────────────────────────────────────────────────────────────

pub fn parse_tweet_card_page(html: &str) -> Result<ListingPage<CardTweet>> {
    let doc = Html::parse_document(html);
    Ok(ListingPage {
        items: extract_tweet_cards(&doc)?,
        next: next_page_ref(&doc)?,
    })
}

pub fn parse_tweet_link_page(html: &str) -> Result<ListingPage<String>> {
    let doc = Html::parse_document(html);
    Ok(ListingPage {
        items: extract_tweet_links(&doc)?,
        next: next_page_ref(&doc)?,
    })
}

pub fn parse_figure_page(html: &str) -> Result<ListingPage<HandleMapping>> {
    let doc = Html::parse_document(html);
    Ok(ListingPage {
        items: extract_figure_cards(&doc)?,
        next: next_page_ref(&doc)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CARDS: &str = r#"
        <div class="grid">
            <a class="box tweet-card" href="/tweet?id=1&account=42">
                <span>Posted Jan 5, 2021</span>
                <span href="/user/jack">@jack</span>
                <span>Retweet</span>
                <p><strong> Jack </strong></p>
                <p><span>metadata</span> just setting up my
                    <em>twttr</em></p>
            </a>
            <a class="box tweet-card" href="/tweet?id=2&account=42">
                <span>Posted Jan 6, 2021</span>
                <p><strong>Jack</strong></p>
            </a>
        </div>
        <a class="pagination-next" href="?account=42&page=2">Next</a>
    "#;

    #[test]
    fn card_fields_are_read_from_fixed_positions() {
        let page = parse_tweet_card_page(TWO_CARDS).unwrap();
        let Extraction::Found(tweets) = page.items else {
            panic!("expected tweets");
        };

        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].tweeted_at.as_deref(), Some("Posted Jan 5, 2021"));
        assert_eq!(tweets[0].user_handle.as_deref(), Some("@jack"));
        assert!(tweets[0].is_retweet);
        assert_eq!(tweets[0].username.as_deref(), Some("Jack"));
        assert_eq!(tweets[0].text.as_deref(), Some("just setting up mytwttr"));
        assert_eq!(page.next.as_deref(), Some("?account=42&page=2"));
    }

    #[test]
    fn card_with_too_few_blocks_keeps_missing_fields() {
        let page = parse_tweet_card_page(TWO_CARDS).unwrap();
        let tweets = page.items.into_records();

        let second = &tweets[1];
        assert_eq!(second.tweeted_at.as_deref(), Some("Posted Jan 6, 2021"));
        assert_eq!(second.user_handle, None);
        assert!(!second.is_retweet);
        assert_eq!(second.username, None);
        assert_eq!(second.text, None);
    }

    #[test]
    fn card_with_extra_blocks_keeps_missing_fields() {
        let html = r#"
            <div class="grid">
                <a class="box tweet-card" href="/tweet?id=3">
                    <span>Posted Jan 7, 2021</span>
                    <p><strong>Jack</strong></p>
                    <p>first paragraph</p>
                    <p>second paragraph</p>
                </a>
            </div>
        "#;
        let tweets = parse_tweet_card_page(html).unwrap().items.into_records();

        assert_eq!(tweets.len(), 1);
        assert_eq!(tweets[0].tweeted_at.as_deref(), Some("Posted Jan 7, 2021"));
        assert_eq!(tweets[0].username, None);
        assert_eq!(tweets[0].text, None);
    }

    #[test]
    fn missing_grid_is_not_found() {
        let page = parse_tweet_card_page(r#"<div class="no-grid"></div>"#).unwrap();
        assert!(page.items.is_not_found());
        assert_eq!(page.next, None);
    }

    #[test]
    fn empty_grid_is_not_found() {
        let page = parse_tweet_link_page(r#"<div class="grid"></div>"#).unwrap();
        assert_eq!(page.items, Extraction::NotFound);
    }

    #[test]
    fn tweet_links_follow_card_order() {
        let page = parse_tweet_link_page(TWO_CARDS).unwrap();
        assert_eq!(
            page.items,
            Extraction::Found(vec![
                "/tweet?id=1&account=42".to_string(),
                "/tweet?id=2&account=42".to_string(),
            ])
        );
    }

    #[test]
    fn disabled_or_mislabelled_next_is_ignored() {
        let disabled = r#"<a class="pagination-next" href="?page=2" disabled>Next</a>"#;
        let doc = Html::parse_document(disabled);
        assert_eq!(next_page_ref(&doc).unwrap(), None);

        let previous = r#"<a class="pagination-next" href="?page=2">Previous</a>"#;
        let doc = Html::parse_document(previous);
        assert_eq!(next_page_ref(&doc).unwrap(), None);
    }

    #[test]
    fn figure_cards_pair_handle_with_id() {
        let html = r#"
            <div class="grid">
                <a class="box figure-card" href="/figures?id=12345">
                    <span href="/user/handle1">handle1</span>
                </a>
                <a class="box figure-card" href="/figures?id=777">
                    <span>no profile link</span>
                </a>
            </div>
        "#;
        let page = parse_figure_page(html).unwrap();
        assert_eq!(
            page.items,
            Extraction::Found(vec![HandleMapping {
                id: "12345".to_string(),
                handle: "handle1".to_string(),
            }])
        );
    }
}
