//! OME-XML image metadata as embedded in the first page of an OME-TIFF.
//!
//! Only the `Image/Pixels` subtree is read: dimension order, sizes, pixel
//! type, physical sizes and channel names. Element names are matched without
//! their namespace, so every OME schema revision parses the same way.

use roxmltree::{Document, Node};

use crate::axes::{AxisLabels, DimensionOrder};
use crate::dtype::DataType;
use crate::error::MetadataError;
use crate::indexer::PlaneCounts;
use crate::source::{PhysicalSize, PhysicalSizes, PixelMeta};

/// Unit assumed when a physical size has no unit attribute.
pub const DEFAULT_PHYSICAL_UNIT: &str = "µm";

/// Parsed OME document.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeMetadata {
    pub images: Vec<OmeImage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OmeImage {
    pub id: String,
    pub name: Option<String>,
    pub pixels: OmePixels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OmePixels {
    pub dimension_order: DimensionOrder,
    pub dtype: DataType,
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    /// Channel count as written, RGB samples included
    pub size_c: usize,
    pub size_t: usize,
    pub physical_size_x: Option<PhysicalSize>,
    pub physical_size_y: Option<PhysicalSize>,
    pub physical_size_z: Option<PhysicalSize>,
    pub interleaved: bool,
    pub samples_per_pixel: usize,
    pub channel_names: Vec<String>,
}

impl OmeMetadata {
    pub fn parse(xml: &str) -> Result<Self, MetadataError> {
        let doc = Document::parse(xml).map_err(|e| MetadataError::Xml(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "OME" {
            return Err(MetadataError::Xml(format!(
                "root element is <{}>, expected <OME>",
                root.tag_name().name()
            )));
        }

        let images = children(root, "Image")
            .map(parse_image)
            .collect::<Result<Vec<_>, _>>()?;
        if images.is_empty() {
            return Err(MetadataError::MissingField("OME/Image".to_string()));
        }
        Ok(Self { images })
    }

    pub fn image(&self, index: usize) -> Result<&OmeImage, MetadataError> {
        self.images.get(index).ok_or_else(|| {
            MetadataError::Unsupported(format!(
                "image {} requested, document has {}",
                index,
                self.images.len()
            ))
        })
    }

    /// Number of pages the images before `index` occupy.
    pub fn planes_before(&self, index: usize) -> usize {
        self.images
            .iter()
            .take(index)
            .map(|image| image.pixels.plane_counts().plane_count())
            .sum()
    }
}

impl OmePixels {
    /// Plane cube of the main IFD chain. RGB samples share a page, so they
    /// do not count as separate channels.
    pub fn plane_counts(&self) -> PlaneCounts {
        let size_c = (self.size_c / self.samples_per_pixel.max(1)).max(1);
        PlaneCounts::new(self.size_t.max(1), size_c, self.size_z.max(1))
    }

    /// True for 3 or 4 samples stored together in one page.
    pub fn is_rgb(&self) -> bool {
        matches!(self.samples_per_pixel, 3 | 4)
    }

    pub fn labels(&self) -> AxisLabels {
        let labels = self.dimension_order.labels();
        if self.is_rgb() {
            labels.with_interleaved_samples()
        } else {
            labels
        }
    }

    /// Full-resolution shape in label order.
    pub fn shape(&self) -> Vec<usize> {
        self.shape_at(self.size_x, self.size_y)
    }

    /// Shape of a level with the given plane size.
    pub fn shape_at(&self, width: usize, height: usize) -> Vec<usize> {
        let counts = self.plane_counts();
        let mut shape: Vec<usize> = self
            .labels()
            .iter()
            .map(|axis| match axis {
                "t" => counts.size_t,
                "c" => counts.size_c,
                "z" => counts.size_z,
                "y" => height,
                "x" => width,
                _ => self.samples_per_pixel,
            })
            .collect();
        shape.shrink_to_fit();
        shape
    }

    pub fn physical_sizes(&self) -> PhysicalSizes {
        PhysicalSizes {
            x: self.physical_size_x.clone(),
            y: self.physical_size_y.clone(),
            z: self.physical_size_z.clone(),
        }
    }

    pub fn meta(&self) -> PixelMeta {
        let sizes = self.physical_sizes();
        PixelMeta {
            physical_sizes: (!sizes.is_empty()).then_some(sizes),
            photometric_interpretation: None,
        }
    }
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn parse_image(node: Node<'_, '_>) -> Result<OmeImage, MetadataError> {
    let pixels = children(node, "Pixels")
        .next()
        .ok_or_else(|| MetadataError::MissingField("Image/Pixels".to_string()))?;
    Ok(OmeImage {
        id: node.attribute("ID").unwrap_or_default().to_string(),
        name: node.attribute("Name").map(str::to_string),
        pixels: parse_pixels(pixels)?,
    })
}

fn parse_pixels(node: Node<'_, '_>) -> Result<OmePixels, MetadataError> {
    let dimension_order = DimensionOrder::parse(required(node, "DimensionOrder")?)
        .map_err(|e| MetadataError::Unsupported(e.to_string()))?;
    let dtype = DataType::from_ome(required(node, "Type")?)?;

    let channels: Vec<Node> = children(node, "Channel").collect();
    let samples_per_pixel = match channels.first().and_then(|c| c.attribute("SamplesPerPixel")) {
        Some(value) => parse_number::<usize>("Channel/SamplesPerPixel", value)?.max(1),
        None => 1,
    };
    let channel_names = channels
        .iter()
        .enumerate()
        .map(|(i, c)| match c.attribute("Name") {
            Some(name) => name.to_string(),
            None => format!("Channel {}", i),
        })
        .collect();

    Ok(OmePixels {
        dimension_order,
        dtype,
        size_x: size(node, "SizeX")?,
        size_y: size(node, "SizeY")?,
        size_z: size(node, "SizeZ")?,
        size_c: size(node, "SizeC")?,
        size_t: size(node, "SizeT")?,
        physical_size_x: physical_size(node, "X")?,
        physical_size_y: physical_size(node, "Y")?,
        physical_size_z: physical_size(node, "Z")?,
        interleaved: node
            .attribute("Interleaved")
            .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        samples_per_pixel,
        channel_names,
    })
}

fn required<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, MetadataError> {
    node.attribute(name)
        .ok_or_else(|| MetadataError::MissingField(format!("Pixels/@{}", name)))
}

fn size(node: Node<'_, '_>, name: &str) -> Result<usize, MetadataError> {
    parse_number(name, required(node, name)?)
}

fn physical_size(node: Node<'_, '_>, axis: &str) -> Result<Option<PhysicalSize>, MetadataError> {
    let Some(value) = node.attribute(format!("PhysicalSize{}", axis).as_str()) else {
        return Ok(None);
    };
    let unit = node
        .attribute(format!("PhysicalSize{}Unit", axis).as_str())
        .unwrap_or(DEFAULT_PHYSICAL_UNIT);
    Ok(Some(PhysicalSize {
        size: parse_number(axis, value)?,
        unit: unit.to_string(),
    }))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, MetadataError> {
    value
        .trim()
        .parse()
        .map_err(|_| MetadataError::Xml(format!("{} is not a number: '{}'", name, value)))
}
