#![forbid(unsafe_code)]

//! XML writing utilities for signature template building.

/// A simple XML writer for building signature documents.
///
/// Wraps `xmlwriter::XmlWriter` with no indentation, so the emitted text
/// is already in the one-line form canonicalization expects.
pub struct XmlWriter {
    writer: xmlwriter::XmlWriter,
}

impl XmlWriter {
    /// Create a new XML writer without indentation.
    pub fn new() -> Self {
        let opt = xmlwriter::Options {
            use_single_quote: false,
            indent: xmlwriter::Indent::None,
            attributes_indent: xmlwriter::Indent::None,
        };
        Self {
            writer: xmlwriter::XmlWriter::new(opt),
        }
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.writer.start_element(name);
        for (k, v) in attrs {
            self.writer.write_attribute(k, v);
        }
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_element(name, attrs);
        self.writer.end_element();
    }

    /// End the most recently started element.
    pub fn end_element(&mut self) {
        self.writer.end_element();
    }

    /// Write escaped text content.
    ///
    /// `xmlwriter` emits text verbatim, so the markup characters are
    /// escaped here. An empty string still forces the enclosing element
    /// into open-close form.
    pub fn write_text(&mut self, text: &str) {
        if text.contains(['&', '<', '>']) {
            let escaped = text
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;");
            self.writer.write_text(&escaped);
        } else {
            self.writer.write_text(text);
        }
    }

    /// Finish writing, closing any open elements, and return the XML.
    pub fn into_string(self) -> String {
        self.writer.end_document()
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_elements_without_indentation() {
        let mut w = XmlWriter::new();
        w.start_element("a", &[("x", "1")]);
        w.start_element("b", &[]);
        w.write_text("t<>&");
        w.end_element();
        w.empty_element("c", &[]);
        w.end_element();
        let out = w.into_string();
        assert_eq!(out, "<a x=\"1\"><b>t&lt;&gt;&amp;</b><c/></a>");
    }
}
