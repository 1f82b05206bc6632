//! Response Segmentation
//!
//! Splits an answer into pieces that fit the host platform's per-message limit.
//! Splits land at fixed character offsets with no word or sentence boundary
//! search; continuation markers show where a piece was cut. Lengths are counted
//! in `char`s, and every rendered piece, markers included, fits the limit.

/// Per-message limit of the host platform
pub const DEFAULT_MESSAGE_LIMIT: usize = 2000;

/// Minimum characters reserved for continuation markers on every split segment
pub const DEFAULT_MARGIN: usize = 24;

/// Fixed characters of one marker: `(`, `/`, `)`, `…` and the line break
const MARKER_FIXED_CHARS: usize = 5;

/// One ordered piece of an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position
    pub index: usize,

    /// Number of segments the answer was split into
    pub total: usize,

    /// Unmarked slice of the original text
    pub body: String,

    /// Whether `render` adds continuation markers
    pub marked: bool,
}

impl Segment {
    /// Text to post: the body with continuation markers when the answer was split
    pub fn render(&self) -> String {
        if !self.marked || self.total <= 1 {
            return self.body.clone();
        }

        let mut out = String::with_capacity(self.body.len() + 32);
        if self.index > 1 {
            out.push_str(&format!("({}/{})…\n", self.index, self.total));
        }
        out.push_str(&self.body);
        if self.index < self.total {
            out.push_str(&format!("\n…({}/{})", self.index, self.total));
        }
        out
    }
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

/// Upper bound on the marker characters one segment carries when split `total` ways
fn marker_overhead(total: usize) -> usize {
    let marker = MARKER_FIXED_CHARS + 2 * digits(total);
    if total <= 2 {
        marker
    } else {
        2 * marker
    }
}

/// Fixed-offset splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSegmenter {
    limit: usize,
    margin: usize,
}

impl Default for ResponseSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LIMIT, DEFAULT_MARGIN)
    }
}

impl ResponseSegmenter {
    /// `margin` is the minimum reservation; more is reserved when the markers need it
    pub fn new(limit: usize, margin: usize) -> Self {
        Self {
            limit: limit.max(1),
            margin,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Segment count and body size for `len` chars.
    ///
    /// `None` when the limit leaves no room for a body next to the markers.
    fn layout(&self, len: usize) -> Option<(usize, usize)> {
        let mut total = 2;
        loop {
            let reserved = self.margin.max(marker_overhead(total));
            if reserved >= self.limit {
                return None;
            }

            let body = self.limit - reserved;
            let needed = len.div_ceil(body);
            if needed <= total {
                return Some((needed, body));
            }
            total = needed;
        }
    }

    /// Split `text`; the bodies concatenate back to `text` exactly
    pub fn segment(&self, text: &str) -> Vec<Segment> {
        let len = text.chars().count();
        if len <= self.limit {
            return vec![Segment {
                index: 1,
                total: 1,
                body: text.to_string(),
                marked: false,
            }];
        }

        let (body_size, marked) = match self.layout(len) {
            Some((_, body)) => (body, true),
            None => (self.limit, false),
        };

        let chars: Vec<char> = text.chars().collect();
        let bodies: Vec<String> = chars
            .chunks(body_size)
            .map(|chunk| chunk.iter().collect())
            .collect();
        let total = bodies.len();

        bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| Segment {
                index: i + 1,
                total,
                body,
                marked,
            })
            .collect()
    }

    /// Split and render in one step
    pub fn render(&self, text: &str) -> Vec<String> {
        self.segment(text).iter().map(Segment::render).collect()
    }
}

/// Split `text` for a platform limit using the default margin
pub fn segment(text: &str, limit: usize) -> Vec<Segment> {
    ResponseSegmenter::new(limit, DEFAULT_MARGIN).segment(text)
}
