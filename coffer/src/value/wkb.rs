//! WKB to WKT
//!
//! Renders a Well-Known-Binary geometry as Well-Known-Text. Every geometry, including every
//! nested one, starts with its own byte order flag, so nested geometries may mix byte orders.
//!
//! The thousands digit of a geometry type code selects the coordinate dimensions:
//!
//! | digit | dimensions | tag  |
//! |-------|------------|------|
//! | 0     | 2          |      |
//! | 1     | 3          | `Z`  |
//! | 2     | 3          | `M`  |
//! | 3     | 4          | `ZM` |
//!
//! Output is written to a [`StringBuilder`], which keeps counting when its buffer is too small.
//! If rendering fails part way, whatever was written before the failure stays written.

use crate::builder::StringBuilder;
use crate::error::{CofferError, Result};

/// Deepest nesting of geometries which will be written.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Outcome of rendering into a caller supplied buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WkbtotResult {
    /// Bytes the complete text needs, including its terminator
    pub written: usize,
    /// Was the buffer too small to hold it?
    pub buffer_too_small: bool,
}

#[derive(Clone, Copy, Debug)]
enum ByteOrder {
    Big,
    Little,
}

#[derive(Clone, Copy, Debug)]
struct CoordMode {
    dimensions: usize,
    tag: Option<&'static str>,
}

const COORD_MODES: [CoordMode; 4] = [
    CoordMode {
        dimensions: 2,
        tag: None,
    },
    CoordMode {
        dimensions: 3,
        tag: Some("Z"),
    },
    CoordMode {
        dimensions: 3,
        tag: Some("M"),
    },
    CoordMode {
        dimensions: 4,
        tag: Some("ZM"),
    },
];

#[derive(Clone, Copy, Debug)]
enum Visitor {
    Empty,
    Point,
    LinearRing,
    AnyGeometry,
}

#[derive(Clone, Copy, Debug)]
enum Child {
    // Children are geometries of this kind, their names aren't written
    Geometry(&'static Geometry),
    Visitor(Visitor),
    // A valid code with no text representation
    Reserved,
}

#[derive(Debug)]
struct Geometry {
    code: u32,
    name: &'static str,
    has_child_count: bool,
    child: Child,
}

const fn reserved(code: u32, name: &'static str) -> Geometry {
    Geometry {
        code,
        name,
        has_child_count: false,
        child: Child::Reserved,
    }
}

// Abstract, any geometry qualifies
static GEOMETRY: Geometry = Geometry {
    code: 0,
    name: "GEOMETRY",
    has_child_count: false,
    child: Child::Visitor(Visitor::Empty),
};
static POINT: Geometry = Geometry {
    code: 1,
    name: "POINT",
    has_child_count: false,
    child: Child::Visitor(Visitor::Point),
};
static LINESTRING: Geometry = Geometry {
    code: 2,
    name: "LINESTRING",
    has_child_count: true,
    child: Child::Visitor(Visitor::Point),
};
static POLYGON: Geometry = Geometry {
    code: 3,
    name: "POLYGON",
    has_child_count: true,
    child: Child::Visitor(Visitor::LinearRing),
};
static MULTIPOINT: Geometry = Geometry {
    code: 4,
    name: "MULTIPOINT",
    has_child_count: true,
    child: Child::Geometry(&POINT),
};
static MULTILINESTRING: Geometry = Geometry {
    code: 5,
    name: "MULTILINESTRING",
    has_child_count: true,
    child: Child::Geometry(&LINESTRING),
};
static MULTIPOLYGON: Geometry = Geometry {
    code: 6,
    name: "MULTIPOLYGON",
    has_child_count: true,
    child: Child::Geometry(&POLYGON),
};
static GEOMETRYCOLLECTION: Geometry = Geometry {
    code: 7,
    name: "GEOMETRYCOLLECTION",
    has_child_count: true,
    child: Child::Visitor(Visitor::AnyGeometry),
};
static CIRCULARSTRING: Geometry = reserved(8, "CIRCULARSTRING");
static COMPOUNDCURVE: Geometry = reserved(9, "COMPOUNDCURVE");
static CURVEPOLYGON: Geometry = reserved(10, "CURVEPOLYGON");
static MULTICURVE: Geometry = reserved(11, "MULTICURVE");
static MULTISURFACE: Geometry = reserved(12, "MULTISURFACE");
static CURVE: Geometry = reserved(13, "CURVE");
static SURFACE: Geometry = reserved(14, "SURFACE");
static POLYHEDRALSURFACE: Geometry = Geometry {
    code: 15,
    name: "POLYHEDRALSURFACE",
    has_child_count: true,
    child: Child::Geometry(&POLYGON),
};
static TIN: Geometry = Geometry {
    code: 16,
    name: "TIN",
    has_child_count: true,
    child: Child::Geometry(&POLYGON),
};
static TRIANGLE: Geometry = Geometry {
    code: 17,
    name: "TRIANGLE",
    has_child_count: true,
    child: Child::Visitor(Visitor::LinearRing),
};

// Indexed by geometry code
static GEOMETRIES: [&Geometry; 18] = [
    &GEOMETRY,
    &POINT,
    &LINESTRING,
    &POLYGON,
    &MULTIPOINT,
    &MULTILINESTRING,
    &MULTIPOLYGON,
    &GEOMETRYCOLLECTION,
    &CIRCULARSTRING,
    &COMPOUNDCURVE,
    &CURVEPOLYGON,
    &MULTICURVE,
    &MULTISURFACE,
    &CURVE,
    &SURFACE,
    &POLYHEDRALSURFACE,
    &TIN,
    &TRIANGLE,
];

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
    order: ByteOrder,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .bytes
            .get(self.position..self.position + N)
            .ok_or_else(|| {
                CofferError::CorruptData(format!(
                    "WKB ends at: {}, {N} more bytes needed at: {}",
                    self.bytes.len(),
                    self.position
                ))
            })?;
        self.position += N;
        // The slice is N long
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn byte_order(&mut self) -> Result<()> {
        let [flag] = self.take::<1>()?;
        self.order = match flag {
            0 => ByteOrder::Big,
            1 => ByteOrder::Little,
            other => {
                return Err(CofferError::InvalidInput(format!(
                    "WKB byte order: {other}"
                )))
            }
        };
        Ok(())
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take::<4>()?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        })
    }

    fn f64(&mut self) -> Result<f64> {
        let bytes = self.take::<8>()?;
        Ok(match self.order {
            ByteOrder::Big => f64::from_be_bytes(bytes),
            ByteOrder::Little => f64::from_le_bytes(bytes),
        })
    }
}

struct WktWriter<'a, 'b, 'c> {
    reader: Reader<'a>,
    builder: &'b mut StringBuilder<'c>,
    coord_mode: CoordMode,
    decimal_places: u8,
    // A geometry name was the last thing written
    after_name: bool,
    // Geometries currently being written
    depth: usize,
}

impl WktWriter<'_, '_, '_> {
    fn add_char(&mut self, c: u8) {
        self.builder.add_char(c);
        self.after_name = false;
    }

    fn write_empty(&mut self) {
        if self.after_name {
            self.builder.add_char(b' ');
        }
        self.builder.add_str("EMPTY");
        self.after_name = false;
    }

    fn write_name(&mut self, name: &str) {
        self.builder.add_str(name);
        if let Some(tag) = self.coord_mode.tag {
            self.builder.add_char(b' ').add_str(tag);
        }
        self.after_name = true;
    }

    fn point(&mut self) -> Result<()> {
        for i in 0..self.coord_mode.dimensions {
            if i > 0 {
                self.add_char(b' ');
            }
            let coord = self.reader.f64()?;
            self.builder.add_double(coord, self.decimal_places);
            self.after_name = false;
        }
        Ok(())
    }

    fn visit(&mut self, child: Child) -> Result<()> {
        match child {
            Child::Visitor(Visitor::Empty) => {
                self.write_empty();
                Ok(())
            }
            Child::Visitor(Visitor::Point) => self.point(),
            Child::Visitor(Visitor::LinearRing) => self.counted(Child::Visitor(Visitor::Point)),
            Child::Visitor(Visitor::AnyGeometry) => self.geometry(None),
            Child::Geometry(expected) => self.geometry(Some(expected)),
            Child::Reserved => Err(CofferError::InvalidInput(
                "reserved geometry has no children".to_string(),
            )),
        }
    }

    fn parenthesized(&mut self, child: Child, count: u32) -> Result<()> {
        self.add_char(b'(');
        for i in 0..count {
            if i > 0 {
                self.add_char(b',');
            }
            self.visit(child)?;
        }
        self.add_char(b')');
        Ok(())
    }

    fn counted(&mut self, child: Child) -> Result<()> {
        match self.reader.u32()? {
            0 => {
                self.write_empty();
                Ok(())
            }
            count => self.parenthesized(child, count),
        }
    }

    fn geometry(&mut self, expected: Option<&'static Geometry>) -> Result<()> {
        if self.depth == MAX_NESTING_DEPTH {
            return Err(CofferError::InvalidInput(format!(
                "WKB geometries nested more than {MAX_NESTING_DEPTH} deep"
            )));
        }
        self.depth += 1;
        let result = self.nested_geometry(expected);
        self.depth -= 1;
        result
    }

    // When the kind is known from the parent, the name isn't written
    fn nested_geometry(&mut self, expected: Option<&'static Geometry>) -> Result<()> {
        self.reader.byte_order()?;
        let full_code = self.reader.u32()?;
        let (coord_type, code) = (full_code / 1000, full_code % 1000);

        self.coord_mode = *COORD_MODES.get(coord_type as usize).ok_or_else(|| {
            CofferError::InvalidInput(format!("WKB coordinate type: {coord_type}"))
        })?;
        let geometry = GEOMETRIES
            .get(code as usize)
            .ok_or_else(|| CofferError::InvalidInput(format!("WKB geometry code: {code}")))?;

        match expected {
            Some(expected) if expected.code != geometry.code => {
                return Err(CofferError::InvalidInput(format!(
                    "expected {} but found {}",
                    expected.name, geometry.name
                )));
            }
            Some(_) => (),
            None => self.write_name(geometry.name),
        }

        if let Child::Reserved = geometry.child {
            return Err(CofferError::InvalidInput(format!(
                "{} can't be written as WKT",
                geometry.name
            )));
        }

        if geometry.has_child_count {
            self.counted(geometry.child)
        } else {
            self.parenthesized(geometry.child, 1)
        }
    }
}

/// Render `wkb` as WKT into `builder`, with at most `decimal_places` in each coordinate.
pub fn write_wkb_as_wkt(
    wkb: &[u8],
    decimal_places: u8,
    builder: &mut StringBuilder<'_>,
) -> Result<()> {
    let mut writer = WktWriter {
        reader: Reader {
            bytes: wkb,
            position: 0,
            order: ByteOrder::Little,
        },
        builder,
        coord_mode: COORD_MODES[0],
        decimal_places,
        after_name: false,
        depth: 0,
    };
    writer.geometry(None)
}

/// Render `wkb` as terminated WKT into `buffer`.
///
/// If the buffer is too small the text is truncated and the result says how big it needs to
/// be.
pub fn convert_wkb_to_wkt(
    wkb: &[u8],
    buffer: &mut [u8],
    decimal_places: u8,
) -> Result<WkbtotResult> {
    let mut builder = StringBuilder::new(buffer);
    write_wkb_as_wkt(wkb, decimal_places, &mut builder)?;
    builder.complete();
    Ok(WkbtotResult {
        written: builder.added(),
        buffer_too_small: builder.is_full(),
    })
}
