use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type CompareFn = dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync;

/// User-configurable key ordering shared by the index, the pages and the
/// catalog.
///
/// Cloning is cheap (reference-counted). The default orders keys bytewise.
#[derive(Clone)]
pub struct Comparator(Arc<CompareFn>);

impl Comparator {
    /// Wraps an arbitrary total order over key bytes.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Lexicographic byte order.
    pub fn bytewise() -> Self {
        Self::new(|a, b| a.cmp(b))
    }

    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (self.0)(a, b)
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::bytewise()
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparator")
    }
}

/// Key bytes bundled with the comparator that orders them, so that ordered
/// std collections can be keyed by comparator-defined order.
#[derive(Clone)]
pub struct OrderedKey {
    bytes: Vec<u8>,
    cmp: Comparator,
}

impl OrderedKey {
    pub fn new(bytes: Vec<u8>, cmp: Comparator) -> Self {
        Self { bytes, cmp }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp.compare(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderedKey({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

/// Direction and bound of a positioned read.
///
/// `Gte`/`Gt` walk ascending, `Lte`/`Lt` walk descending. The strict variants
/// exclude a seek key that matches exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Order {
    /// `true` for the ascending orders.
    #[inline]
    pub fn is_forward(self) -> bool {
        matches!(self, Order::Gte | Order::Gt)
    }

    /// The strict order in the same direction, used to step past a key that
    /// has already been returned.
    #[inline]
    pub fn strict(self) -> Order {
        if self.is_forward() {
            Order::Gt
        } else {
            Order::Lt
        }
    }

    /// Whether `ord` (candidate compared to the seek key) satisfies this
    /// bound.
    #[inline]
    pub fn accepts(self, ord: Ordering) -> bool {
        match self {
            Order::Gte => ord != Ordering::Less,
            Order::Gt => ord == Ordering::Greater,
            Order::Lte => ord != Ordering::Greater,
            Order::Lt => ord == Ordering::Less,
        }
    }
}
