//! Locally resolved URL templates.
//!
//! A `template:` URI carries a tile URL pattern instead of the address of a
//! resolver service, e.g. `template:https://{s}.tile.example/{z}/{x}/{y}.png`.
//!
//! | Placeholder | Replaced with |
//! |-------------|---------------|
//! | `{z}`       | zoom level |
//! | `{x}`       | column |
//! | `{y}`       | row, XYZ numbering |
//! | `{-y}`      | row, TMS numbering |
//! | `{s}`       | subdomain `a`, `b` or `c`, chosen by tile |
//! | `{q}`       | quadkey |

use url::Url;

use super::{ResolverConnection, ResolverProtocol};
use crate::error::ResolverError;
use crate::tile::TileCoordinate;

/// URI scheme handled by [`TemplateProtocol`].
pub const TEMPLATE_SCHEME: &str = "template";

const SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// Protocol for `template:` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateProtocol;

impl ResolverProtocol for TemplateProtocol {
    fn connect(&self, uri: &str) -> Result<Box<dyn ResolverConnection>, ResolverError> {
        let open_error = |reason: &str| ResolverError::Open {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let template = uri
            .strip_prefix(TEMPLATE_SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| open_error("not a template URI"))?;

        let has_row = template.contains("{y}") || template.contains("{-y}");
        let has_quadkey = template.contains("{q}");
        if !has_quadkey && !(template.contains("{z}") && template.contains("{x}") && has_row) {
            return Err(open_error("template needs {z}, {x} and {y}, or {q}"));
        }

        let sample = render(template, &TileCoordinate::new(0, 0, 0));
        Url::parse(&sample).map_err(|e| open_error(&e.to_string()))?;

        Ok(Box::new(TemplateConnection {
            template: template.to_string(),
        }))
    }
}

struct TemplateConnection {
    template: String,
}

impl ResolverConnection for TemplateConnection {
    fn query(&mut self, coordinate: &TileCoordinate) -> Result<Option<String>, ResolverError> {
        Ok(Some(render(&self.template, coordinate)))
    }
}

fn render(template: &str, coordinate: &TileCoordinate) -> String {
    let tms_row = coordinate.tiles_per_axis() as i64 - 1 - coordinate.y as i64;
    let subdomain = SUBDOMAINS[(coordinate.x as usize + coordinate.y as usize) % SUBDOMAINS.len()];

    template
        .replace("{z}", &coordinate.zoom.to_string())
        .replace("{x}", &coordinate.x.to_string())
        .replace("{-y}", &tms_row.to_string())
        .replace("{y}", &coordinate.y.to_string())
        .replace("{s}", subdomain)
        .replace("{q}", &quadkey(coordinate))
}

/// Bing Maps quadkey for a tile.
fn quadkey(coordinate: &TileCoordinate) -> String {
    (1..=coordinate.zoom)
        .rev()
        .map(|level| {
            let mask = 1 << (level - 1);
            let mut digit = b'0';
            if coordinate.x & mask != 0 {
                digit += 1;
            }
            if coordinate.y & mask != 0 {
                digit += 2;
            }
            char::from(digit)
        })
        .collect()
}
