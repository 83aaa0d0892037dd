//! AcroForm rendering engine.
//!
//! Opens a fillable PDF with `lopdf`, writes payload values into its fields,
//! stamps an optional logo on the first page and saves the result.

use std::path::Path;

use actix_web::web;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde_json::Value;

use super::{RenderError, RenderJob, Renderer};
use crate::template::{merge_fields, FieldSet, MergeError, TemplateResolver};

const LOGO_SIZE: f32 = 200.0;
const LOGO_MARGIN: f32 = 24.0;
const LOGO_XOBJECT: &str = "TemplateLogo";
const JPEG_QUALITY: u8 = 90;
/// Upper-right corner of an A4 page, used when a page has no readable MediaBox.
const A4_CORNER: (f32, f32) = (595.0, 842.0);
/// Guards against reference cycles in malformed field and page trees.
const MAX_TREE_DEPTH: usize = 32;

pub struct AcroFormRenderer {
    resolver: TemplateResolver,
}

impl AcroFormRenderer {
    pub fn new(resolver: TemplateResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Renderer for AcroFormRenderer {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError> {
        let logo = self.resolver.resolve_logo(&job.template_name)?;
        if let Some(path) = &logo {
            log::debug!("Stamping logo {} on '{}'", path.display(), job.template_name);
        }

        web::block(move || fill_template(&job.template_path, &job.payload, logo.as_deref()))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))?
    }
}

/// Fills `template` with `payload` and returns the saved PDF.
pub fn fill_template(
    template: &Path,
    payload: &Value,
    logo: Option<&Path>,
) -> Result<Vec<u8>, RenderError> {
    if !payload.is_object() {
        return Err(MergeError::InvalidPayloadShape.into());
    }

    let mut doc = Document::load(template)?;
    {
        let mut form = AcroForm::open(&mut doc)?;
        merge_fields(&mut form, payload)?;
    }

    if let Some(logo) = logo {
        let bytes = std::fs::read(logo).map_err(RenderError::ReadLogo)?;
        stamp_logo(&mut doc, &bytes)?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(RenderError::WritePdf)?;
    Ok(output)
}

enum FormLocation {
    /// `/AcroForm` is an indirect object.
    Object(ObjectId),
    /// `/AcroForm` is inlined in the catalog with this id.
    Catalog(ObjectId),
}

/// The interactive form of an open document, indexed by fully-qualified
/// field name (`parent.child`).
pub struct AcroForm<'a> {
    doc: &'a mut Document,
    location: FormLocation,
    fields: Vec<(String, ObjectId)>,
}

impl<'a> AcroForm<'a> {
    pub fn open(doc: &'a mut Document) -> Result<Self, RenderError> {
        let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
        let location = match doc.get_dictionary(catalog_id)?.get(b"AcroForm") {
            Ok(Object::Reference(id)) => FormLocation::Object(*id),
            Ok(Object::Dictionary(_)) => FormLocation::Catalog(catalog_id),
            _ => return Err(RenderError::NoAcroForm),
        };

        let form = form_dictionary(doc, &location).map_err(|_| RenderError::NoAcroForm)?;
        let roots: Vec<ObjectId> = match form.get(b"Fields") {
            Ok(fields) => doc
                .dereference(fields)?
                .1
                .as_array()?
                .iter()
                .filter_map(|field| field.as_reference().ok())
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut fields = Vec::new();
        for id in roots {
            collect_fields(doc, id, None, &mut fields, 0);
        }
        log::debug!("AcroForm has {} fields", fields.len());

        Ok(Self {
            doc,
            location,
            fields,
        })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Current `/V` of a text field, if it has one.
    pub fn field_value(&self, name: &str) -> Option<String> {
        let (_, id) = self.fields.iter().find(|(n, _)| n == name)?;
        let value = self.doc.get_dictionary(*id).ok()?.get(b"V").ok()?;
        match value {
            Object::String(bytes, _) => Some(decode_text(bytes)),
            Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn needs_appearances(&self) -> bool {
        form_dictionary(&*self.doc, &self.location)
            .and_then(|form| form.get(b"NeedAppearances"))
            .and_then(Object::as_bool)
            .unwrap_or(false)
    }
}

impl FieldSet for AcroForm<'_> {
    fn set_field(&mut self, name: &str, value: &str) -> Result<bool, MergeError> {
        let Some(&(_, id)) = self.fields.iter().find(|(n, _)| n == name) else {
            return Ok(false);
        };

        let is_button = field_type(&*self.doc, id).as_deref() == Some(b"Btn".as_slice());
        let new_value = if is_button {
            Object::Name(value.as_bytes().to_vec())
        } else {
            text_string(value)
        };

        let widgets = widget_ids(&*self.doc, id);
        let field = self
            .doc
            .get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| MergeError::Field {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        field.set("V", new_value);

        if is_button {
            for widget in widgets {
                if let Ok(dict) = self.doc.get_object_mut(widget).and_then(Object::as_dict_mut) {
                    dict.set("AS", Object::Name(value.as_bytes().to_vec()));
                }
            }
        }

        Ok(true)
    }

    fn mark_needs_appearances(&mut self) -> Result<(), MergeError> {
        let form = form_dictionary_mut(self.doc, &self.location).map_err(|e| MergeError::Field {
            name: "NeedAppearances".to_string(),
            reason: e.to_string(),
        })?;
        form.set("NeedAppearances", true);
        Ok(())
    }
}

fn form_dictionary<'d>(doc: &'d Document, location: &FormLocation) -> lopdf::Result<&'d Dictionary> {
    match location {
        FormLocation::Object(id) => doc.get_dictionary(*id),
        FormLocation::Catalog(catalog_id) => doc.get_dictionary(*catalog_id)?.get(b"AcroForm")?.as_dict(),
    }
}

fn form_dictionary_mut<'d>(
    doc: &'d mut Document,
    location: &FormLocation,
) -> lopdf::Result<&'d mut Dictionary> {
    match location {
        FormLocation::Object(id) => doc.get_object_mut(*id)?.as_dict_mut(),
        FormLocation::Catalog(catalog_id) => doc
            .get_object_mut(*catalog_id)?
            .as_dict_mut()?
            .get_mut(b"AcroForm")?
            .as_dict_mut(),
    }
}

/// Walks the field tree. Nodes whose kids carry no `/T` are terminal fields;
/// their kids are widgets.
fn collect_fields(
    doc: &Document,
    id: ObjectId,
    prefix: Option<&str>,
    out: &mut Vec<(String, ObjectId)>,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };

    let partial = dict.get(b"T").and_then(Object::as_str).ok().map(decode_text);
    let name = match (prefix, partial) {
        (Some(prefix), Some(partial)) => Some(format!("{}.{}", prefix, partial)),
        (None, Some(partial)) => Some(partial),
        (prefix, None) => prefix.map(str::to_string),
    };

    let named_kids: Vec<ObjectId> = kid_ids(dict)
        .into_iter()
        .filter(|kid| doc.get_dictionary(*kid).map(|k| k.has(b"T")).unwrap_or(false))
        .collect();

    if named_kids.is_empty() {
        if let Some(name) = name {
            out.push((name, id));
        }
    } else {
        for kid in named_kids {
            collect_fields(doc, kid, name.as_deref(), out, depth + 1);
        }
    }
}

fn kid_ids(dict: &Dictionary) -> Vec<ObjectId> {
    dict.get(b"Kids")
        .and_then(Object::as_array)
        .map(|kids| kids.iter().filter_map(|kid| kid.as_reference().ok()).collect())
        .unwrap_or_default()
}

/// The field itself plus any widget kids.
fn widget_ids(doc: &Document, id: ObjectId) -> Vec<ObjectId> {
    let mut ids = vec![id];
    if let Ok(dict) = doc.get_dictionary(id) {
        ids.extend(kid_ids(dict));
    }
    ids
}

/// `/FT`, which may be inherited from a parent field.
fn field_type(doc: &Document, mut id: ObjectId) -> Option<Vec<u8>> {
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(field_type) = dict.get(b"FT").and_then(Object::as_name) {
            return Some(field_type.to_vec());
        }
        id = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// ASCII as a literal string, anything else as UTF-16BE with a byte order mark.
fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn decode_text(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE_u8, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Draws the logo in the top-right corner of the first page.
pub fn stamp_logo(doc: &mut Document, logo: &[u8]) -> Result<(), RenderError> {
    let page_id = *doc.get_pages().values().next().ok_or(RenderError::NoPages)?;

    let image = image::load_from_memory(logo)?;
    let xobject_id = embed_image(doc, &image)?;
    doc.add_xobject(page_id, LOGO_XOBJECT, xobject_id)?;

    let (right, top) = page_corner(doc, page_id);
    let x = right - LOGO_MARGIN - LOGO_SIZE;
    let y = top - LOGO_MARGIN - LOGO_SIZE;

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    LOGO_SIZE.into(),
                    0.into(),
                    0.into(),
                    LOGO_SIZE.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(LOGO_XOBJECT.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    doc.add_page_contents(page_id, content.encode()?)?;
    Ok(())
}

fn embed_image(doc: &mut Document, image: &DynamicImage) -> Result<ObjectId, RenderError> {
    let (width, height) = (image.width(), image.height());
    let rgb = image.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode(
        rgb.as_raw(),
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };

    if image.color().has_alpha() {
        let alpha: Vec<u8> = image.to_rgba8().pixels().map(|p| p.0[3]).collect();
        if alpha.iter().any(|&a| a < u8::MAX) {
            let smask_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            ));
            dict.set("SMask", smask_id);
        }
    }

    Ok(doc.add_object(Stream::new(dict, jpeg)))
}

/// Upper-right corner of the page's MediaBox, inherited through `/Parent`.
fn page_corner(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let Some(id) = current else { break };
        let Ok(dict) = doc.get_dictionary(id) else { break };

        if let Ok(media_box) = dict.get(b"MediaBox") {
            if let Some(corner) = upper_right(doc, media_box) {
                return corner;
            }
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    A4_CORNER
}

fn upper_right(doc: &Document, media_box: &Object) -> Option<(f32, f32)> {
    let (_, media_box) = doc.dereference(media_box).ok()?;
    let values = media_box.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    Some((values[2].as_float().ok()?, values[3].as_float().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use serde_json::json;
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn form_pdf(field_names: &[&str], with_page: bool) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::new();
        let mut fields: Vec<Object> = Vec::new();
        if with_page {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());

            for name in field_names {
                let field_id = doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "FT" => "Tx",
                    "T" => Object::string_literal(*name),
                    "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
                    "P" => page_id,
                });
                fields.push(field_id.into());
            }
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let acroform_id = doc.add_object(dictionary! { "Fields" => fields });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => acroform_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn save(dir: &TempDir, name: &str, mut doc: Document) -> PathBuf {
        let path = dir.path().join(name);
        doc.save(&path).unwrap();
        path
    }

    fn logo_png() -> Vec<u8> {
        let mut logo = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
        logo.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(logo)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_fill_sets_field_values() {
        let dir = tempfile::tempdir().unwrap();
        let template = save(&dir, "form.pdf", form_pdf(&["name", "date"], true));

        let bytes = fill_template(&template, &json!({"name": "X", "date": 20250101}), None).unwrap();

        let mut filled = Document::load_mem(&bytes).unwrap();
        let form = AcroForm::open(&mut filled).unwrap();
        assert_eq!(form.field_value("name").as_deref(), Some("X"));
        assert_eq!(form.field_value("date").as_deref(), Some("20250101"));
        assert!(form.needs_appearances());
    }

    #[test]
    fn test_fill_reports_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let template = save(&dir, "form.pdf", form_pdf(&["name", "date"], true));

        let result = fill_template(&template, &json!({"name": "X", "email": "y"}), None);
        match result {
            Err(RenderError::Merge(MergeError::MissingFields(missing))) => {
                assert_eq!(missing, vec!["email".to_string()]);
            }
            other => panic!("expected missing fields, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_fill_rejects_non_object_payload() {
        let dir = tempfile::tempdir().unwrap();
        let template = save(&dir, "form.pdf", form_pdf(&["name"], true));

        let result = fill_template(&template, &json!(["name"]), None);
        assert!(matches!(
            result,
            Err(RenderError::Merge(MergeError::InvalidPayloadShape))
        ));
    }

    #[test]
    fn test_template_without_acroform() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = form_pdf(&[], true);
        let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
        doc.get_object_mut(catalog_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .remove(b"AcroForm");
        let template = save(&dir, "plain.pdf", doc);

        let result = fill_template(&template, &json!({"name": "X"}), None);
        assert!(matches!(result, Err(RenderError::NoAcroForm)));
    }

    #[test]
    fn test_non_ascii_values_round_trip() {
        let mut doc = form_pdf(&["name"], true);
        let mut form = AcroForm::open(&mut doc).unwrap();
        assert!(form.set_field("name", "Zoë Čapek").unwrap());
        assert_eq!(form.field_value("name").as_deref(), Some("Zoë Čapek"));
        assert!(!form.set_field("other", "x").unwrap());
    }

    #[test]
    fn test_nested_field_names_are_qualified() {
        let mut doc = Document::with_version("1.5");
        let child_id = doc.new_object_id();
        let parent_id = doc.add_object(dictionary! {
            "T" => Object::string_literal("address"),
            "Kids" => vec![child_id.into()],
        });
        doc.objects.insert(
            child_id,
            Object::Dictionary(dictionary! {
                "T" => Object::string_literal("city"),
                "FT" => "Tx",
                "Parent" => parent_id,
            }),
        );
        let acroform_id = doc.add_object(dictionary! { "Fields" => vec![parent_id.into()] });
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "AcroForm" => acroform_id });
        doc.trailer.set("Root", catalog_id);

        let form = AcroForm::open(&mut doc).unwrap();
        let names: Vec<&str> = form.field_names().collect();
        assert_eq!(names, vec!["address.city"]);
    }

    #[test]
    fn test_logo_is_drawn_on_first_page() {
        let dir = tempfile::tempdir().unwrap();
        let template = save(&dir, "form.pdf", form_pdf(&["name"], true));
        let logo = dir.path().join("form-logo.png");
        std::fs::write(&logo, logo_png()).unwrap();

        let bytes = fill_template(&template, &json!({"name": "X"}), Some(&logo)).unwrap();

        let filled = Document::load_mem(&bytes).unwrap();
        let page_id = *filled.get_pages().values().next().unwrap();
        let content = String::from_utf8_lossy(&filled.get_page_content(page_id).unwrap()).into_owned();
        assert!(content.contains("/TemplateLogo Do"));
        // 612 - 24 - 200 and 792 - 24 - 200
        assert!(content.contains("388"));
        assert!(content.contains("568"));
    }

    #[test]
    fn test_logo_on_document_without_pages() {
        let mut doc = form_pdf(&[], false);
        let result = stamp_logo(&mut doc, &logo_png());
        assert!(matches!(result, Err(RenderError::NoPages)));
    }

    #[test]
    fn test_page_corner_falls_back_to_a4() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert_eq!(page_corner(&doc, page_id), A4_CORNER);
    }
}
