//! Pagination of a full-height raster into fixed-size pages.
//!
//! The raster is scaled to the page width. Every page draws the same image,
//! shifted up by a whole number of page heights, until the image is used up.

/// Allowed slack when deciding whether image height remains.
const EPSILON: f64 = 1e-6;

/// Page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// ISO A4 portrait (210mm x 297mm).
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

/// One output page cut from the raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: usize,
    /// How far the image is shifted up on this page, in points (`index * page height`).
    pub shift: f64,
    /// Height of the whole scaled image in points.
    pub image_height: f64,
    /// First raster row visible on this page.
    pub row_start: u32,
    /// One past the last raster row visible on this page.
    pub row_end: u32,
}

impl Page {
    pub fn rows(&self) -> u32 {
        self.row_end - self.row_start
    }
}

/// Shifts for an image of `image_height` laid over pages of `page_height`.
///
/// Always yields at least one page; a short image is not sliced.
pub fn page_shifts(image_height: f64, page_height: f64) -> Vec<f64> {
    let mut shifts = vec![0.0];
    let mut height_left = image_height - page_height;

    while height_left > EPSILON {
        shifts.push(shifts.len() as f64 * page_height);
        height_left -= page_height;
    }

    shifts
}

/// Lay a `raster_width` x `raster_height` raster over pages of `page`.
pub fn paginate(raster_width: u32, raster_height: u32, page: PageSize) -> Vec<Page> {
    if raster_width == 0 {
        return vec![Page {
            index: 0,
            shift: 0.0,
            image_height: 0.0,
            row_start: 0,
            row_end: raster_height,
        }];
    }

    let image_height = raster_height as f64 * page.width / raster_width as f64;
    let rows_per_page = page.height * raster_width as f64 / page.width;
    let shifts = page_shifts(image_height, page.height);
    let last = shifts.len() - 1;

    let boundary = |k: usize| -> u32 {
        ((k as f64 * rows_per_page).round() as u32).min(raster_height)
    };

    shifts
        .into_iter()
        .enumerate()
        .map(|(index, shift)| Page {
            index,
            shift,
            image_height,
            row_start: boundary(index),
            row_end: if index == last {
                raster_height
            } else {
                boundary(index + 1)
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_is_ceiling_of_height_ratio() {
        let page_height = 297.0;
        for height in [1u32, 100, 296, 297, 298, 594, 595, 1000, 2970, 2971] {
            let shifts = page_shifts(height as f64, page_height);
            let expected = (height as f64 / page_height).ceil() as usize;
            assert_eq!(shifts.len(), expected, "height {}", height);
        }
    }

    #[test]
    fn test_shifts_are_multiples_of_page_height() {
        let shifts = page_shifts(1000.0, 297.0);
        assert_eq!(shifts, vec![0.0, 297.0, 594.0, 891.0]);
    }

    #[test]
    fn test_short_raster_yields_single_unsliced_page() {
        let pages = paginate(1588, 900, PageSize::A4);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].shift, 0.0);
        assert_eq!(pages[0].row_start, 0);
        assert_eq!(pages[0].row_end, 900);
    }

    #[test]
    fn test_empty_raster_still_has_one_page() {
        assert_eq!(page_shifts(0.0, 297.0).len(), 1);
        assert_eq!(paginate(1588, 0, PageSize::A4).len(), 1);
    }

    #[test]
    fn test_rows_cover_raster_without_gaps_or_overlap() {
        for (width, height) in [(1588u32, 5000u32), (1588, 2245), (1588, 2246), (800, 7777), (3, 1000)] {
            let pages = paginate(width, height, PageSize::A4);
            assert_eq!(pages.first().map(|p| p.row_start), Some(0));
            assert_eq!(pages.last().map(|p| p.row_end), Some(height));
            for pair in pages.windows(2) {
                assert_eq!(pair[0].row_end, pair[1].row_start);
            }
            let total: u32 = pages.iter().map(Page::rows).sum();
            assert_eq!(total, height);
        }
    }

    #[test]
    fn test_page_count_matches_scaled_height() {
        let page = PageSize {
            width: 100.0,
            height: 150.0,
        };
        // 200px wide raster: every 300 rows fill one page.
        assert_eq!(paginate(200, 300, page).len(), 1);
        assert_eq!(paginate(200, 301, page).len(), 2);
        assert_eq!(paginate(200, 900, page).len(), 3);
        let pages = paginate(200, 901, page);
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[3].shift, 450.0);
        assert_eq!(pages[3].rows(), 1);
    }
}
