use std::borrow::Cow;
use std::fmt::Write;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::escape::partial_escape;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;

use crate::DocmergeError;
use crate::DocmergeResult;

/// A node in a parsed XML part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
	Element(XmlElement),
	/// Unescaped character data.
	Text(String),
	/// Raw `<![CDATA[...]]>` content.
	CData(String),
	/// Raw `<!--...-->` content.
	Comment(String),
	/// Raw `<?...?>` content, including the XML declaration.
	Instruction(String),
	/// Raw `<!DOCTYPE ...>` content.
	DocType(String),
}

impl XmlNode {
	pub fn as_element(&self) -> Option<&XmlElement> {
		match self {
			Self::Element(element) => Some(element),
			_ => None,
		}
	}

	pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
		match self {
			Self::Element(element) => Some(element),
			_ => None,
		}
	}
}

/// An element with its qualified name (prefix included, e.g. `w:p`),
/// unescaped attribute values and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
	pub name: String,
	pub attributes: Vec<(String, String)>,
	pub children: Vec<XmlNode>,
}

impl XmlElement {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			attributes: Vec::new(),
			children: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.children.push(XmlNode::Text(text.into()));
		self
	}

	pub fn is(&self, name: &str) -> bool {
		self.name == name
	}

	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}

	pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();

		if let Some(slot) = self.attributes.iter_mut().find(|(key, _)| *key == name) {
			slot.1 = value;
		} else {
			self.attributes.push((name, value));
		}
	}

	pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
		self.children.iter().filter_map(XmlNode::as_element)
	}

	pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
		self.children.iter_mut().filter_map(XmlNode::as_element_mut)
	}

	pub fn child(&self, name: &str) -> Option<&XmlElement> {
		self.elements().find(|element| element.is(name))
	}

	/// Concatenated text of the direct text children.
	pub fn text(&self) -> String {
		self.children
			.iter()
			.filter_map(|node| {
				match node {
					XmlNode::Text(text) | XmlNode::CData(text) => Some(text.as_str()),
					_ => None,
				}
			})
			.collect()
	}
}

/// A parsed XML part: top level nodes (declaration, comments) around a
/// single root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
	pub nodes: Vec<XmlNode>,
}

impl XmlDocument {
	/// Parse `source`, reporting failures against `part` (the package path).
	pub fn parse(part: &str, source: &str) -> DocmergeResult<Self> {
		let invalid = |reason: String| {
			DocmergeError::InvalidXml {
				part: part.to_string(),
				reason,
			}
		};

		let mut reader = Reader::from_str(source);
		let mut stack: Vec<XmlElement> = Vec::new();
		let mut nodes: Vec<XmlNode> = Vec::new();

		loop {
			let event = reader.read_event().map_err(|e| {
				invalid(format!("{e} at byte {}", reader.buffer_position()))
			})?;

			let node = match event {
				Event::Eof => break,
				Event::Start(start) => {
					stack.push(element_from_start(&start).map_err(invalid)?);
					continue;
				}
				Event::End(_) => {
					let Some(element) = stack.pop() else {
						return Err(invalid("unexpected closing tag".to_string()));
					};
					XmlNode::Element(element)
				}
				Event::Empty(start) => XmlNode::Element(element_from_start(&start).map_err(invalid)?),
				Event::Text(text) => {
					XmlNode::Text(
						text.unescape()
							.map_err(|e| invalid(e.to_string()))?
							.into_owned(),
					)
				}
				Event::CData(data) => XmlNode::CData(decode(&data).map_err(invalid)?),
				Event::Comment(comment) => XmlNode::Comment(decode(&comment).map_err(invalid)?),
				Event::Decl(declaration) => XmlNode::Instruction(decode(&declaration).map_err(invalid)?),
				Event::PI(instruction) => XmlNode::Instruction(decode(&instruction).map_err(invalid)?),
				Event::DocType(doctype) => XmlNode::DocType(decode(&doctype).map_err(invalid)?),
			};

			match stack.last_mut() {
				Some(parent) => parent.children.push(node),
				None => nodes.push(node),
			}
		}

		if let Some(unclosed) = stack.last() {
			return Err(invalid(format!("unclosed element `{}`", unclosed.name)));
		}

		let document = Self { nodes };
		if document.root().is_none() {
			return Err(invalid("missing root element".to_string()));
		}

		Ok(document)
	}

	pub fn root(&self) -> Option<&XmlElement> {
		self.nodes.iter().find_map(XmlNode::as_element)
	}

	pub fn root_mut(&mut self) -> Option<&mut XmlElement> {
		self.nodes.iter_mut().find_map(XmlNode::as_element_mut)
	}

	/// Serialize back to XML text. Elements without children are written in
	/// their self-closing form.
	pub fn to_xml(&self) -> String {
		let mut output = String::new();
		for node in &self.nodes {
			write_node(&mut output, node);
		}
		output
	}
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, String> {
	let mut element = XmlElement::new(decode(start.name().as_ref())?);

	for attribute in start.attributes() {
		let attribute = attribute.map_err(|e| e.to_string())?;
		let key = decode(attribute.key.as_ref())?;
		let value = attribute
			.unescape_value()
			.map_err(|e| e.to_string())?
			.into_owned();
		element.attributes.push((key, value));
	}

	Ok(element)
}

fn decode(bytes: &[u8]) -> Result<String, String> {
	std::str::from_utf8(bytes)
		.map(ToString::to_string)
		.map_err(|e| e.to_string())
}

fn write_node(output: &mut String, node: &XmlNode) {
	match node {
		XmlNode::Element(element) => write_element(output, element),
		XmlNode::Text(text) => output.push_str(&partial_escape(text.as_str())),
		XmlNode::CData(data) => {
			let _ = write!(output, "<![CDATA[{data}]]>");
		}
		XmlNode::Comment(comment) => {
			let _ = write!(output, "<!--{comment}-->");
		}
		XmlNode::Instruction(instruction) => {
			let _ = write!(output, "<?{instruction}?>");
		}
		XmlNode::DocType(doctype) => {
			let _ = write!(output, "<!DOCTYPE {doctype}>");
		}
	}
}

fn write_element(output: &mut String, element: &XmlElement) {
	output.push('<');
	output.push_str(&element.name);

	for (key, value) in &element.attributes {
		let value: Cow<'_, str> = escape(value.as_str());
		let _ = write!(output, " {key}=\"{value}\"");
	}

	if element.children.is_empty() {
		output.push_str("/>");
		return;
	}

	output.push('>');
	for child in &element.children {
		write_node(output, child);
	}
	let _ = write!(output, "</{}>", element.name);
}
