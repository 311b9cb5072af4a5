//! WPS request encoding and response decoding for the Data Processing System.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};
use crate::job::{JobMetrics, JobStatus};
use crate::xml::{self, XmlNode};

/// Inputs DPS derives from the request itself; user inputs may not reuse them.
pub(crate) const RESERVED_INPUTS: [&str; 6] =
    ["algo_id", "version", "inputs", "identifier", "queue", "username"];

/// Builds the WPS 2.0 `Execute` document for a job submission.
pub(crate) fn encode_execute(
    algo_id: &str,
    version: &str,
    inputs: &[(&str, &str)],
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("wps:Execute");
    root.push_attribute(("xmlns:wps", "http://www.opengis.net/wps/2.0"));
    root.push_attribute(("xmlns:ows", "http://www.opengis.net/ows/2.0"));
    root.push_attribute(("xmlns:xlink", "http://www.w3.org/1999/xlink"));
    root.push_attribute(("service", "WPS"));
    root.push_attribute(("version", "2.0.0"));
    root.push_attribute(("response", "document"));
    root.push_attribute(("mode", "async"));
    writer.write_event(Event::Start(root))?;

    write_text_element(
        &mut writer,
        BytesStart::new("ows:Identifier"),
        &format!("{}:{}", algo_id, version),
    )?;

    for (name, value) in inputs {
        let mut input = BytesStart::new("wps:Input");
        input.push_attribute(("id", *name));
        writer.write_event(Event::Start(input))?;
        writer.write_event(Event::Start(BytesStart::new("wps:Data")))?;
        write_text_element(&mut writer, BytesStart::new("wps:LiteralValue"), value)?;
        writer.write_event(Event::End(BytesEnd::new("wps:Data")))?;
        writer.write_event(Event::End(BytesEnd::new("wps:Input")))?;
    }

    let mut output = BytesStart::new("wps:Output");
    output.push_attribute(("id", "output"));
    output.push_attribute(("transmission", "reference"));
    writer.write_event(Event::Empty(output))?;

    writer.write_event(Event::End(BytesEnd::new("wps:Execute")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::Parse(format!("execute document: {}", e)))
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, start: BytesStart<'_>, text: &str) -> Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Job id from a submission response.
///
/// DPS answers 200 even for malformed requests, with an `ExceptionReport` body.
pub(crate) fn parse_submit_response(body: &str) -> Result<String> {
    let doc = xml::parse(body)?;

    if let Some(exception) = doc.find(&|n| n.name == "Exception") {
        let code = exception.attr("exceptionCode").unwrap_or("unknown").to_string();
        let detail = exception
            .find(&|n| n.name == "ExceptionText")
            .and_then(XmlNode::text)
            .unwrap_or("Bad Request")
            .to_string();
        return Err(Error::JobRejected { code, detail });
    }

    doc.find(&|n| n.name == "JobID")
        .or_else(|| doc.children.first())
        .and_then(XmlNode::text)
        .map(str::to_string)
        .ok_or_else(|| Error::Parse(format!("submission response without job id: {}", body)))
}

pub(crate) fn parse_status(body: &str) -> Result<JobStatus> {
    let doc = xml::parse(body)?;
    let node = doc
        .children
        .iter()
        .find(|c| c.name.ends_with("Status"))
        .ok_or_else(|| Error::Parse(format!("status response without Status: {}", body)))?;
    node.text().unwrap_or_default().parse()
}

/// Output locations and error lines from a result document.
pub(crate) fn parse_result(body: &str) -> Result<(Vec<String>, Vec<String>)> {
    let doc = xml::parse(body)?;
    let mut outputs = Vec::new();
    let mut traceback = Vec::new();

    for child in &doc.children {
        if child.name.ends_with("Output") {
            outputs.extend(
                child
                    .children
                    .iter()
                    .filter(|d| d.name.ends_with("Data"))
                    .filter_map(|d| d.text().map(str::to_string)),
            );
        } else if child.name.ends_with("Error") {
            traceback.extend(
                child
                    .children
                    .iter()
                    .filter_map(|d| d.text().map(str::to_string)),
            );
        }
    }
    Ok((outputs, traceback))
}

pub(crate) fn parse_metrics(body: &str) -> Result<JobMetrics> {
    let doc = xml::parse(body)?;
    Ok(JobMetrics::from_pairs(
        doc.children
            .iter()
            .map(|c| (c.name.clone(), c.text().map(str::to_string))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_document_escapes_values() {
        let xml = encode_execute(
            "my_algo",
            "main",
            &[("identifier", "run-1"), ("input_file", "s3://b/k?a=1&b=<2>")],
        )
        .unwrap();
        assert!(xml.contains("<ows:Identifier>my_algo:main</ows:Identifier>"));
        assert!(xml.contains(r#"<wps:Input id="identifier">"#));
        assert!(xml.contains("s3://b/k?a=1&amp;b=&lt;2&gt;"));

        let doc = xml::parse(&xml).unwrap();
        let inputs: Vec<_> = doc.children.iter().filter(|c| c.name == "Input").collect();
        assert_eq!(inputs.len(), 2);
        assert_eq!(
            inputs[1].find(&|n| n.name == "LiteralValue").and_then(XmlNode::text),
            Some("s3://b/k?a=1&b=<2>")
        );
    }

    #[test]
    fn submit_response_job_id() {
        let id = parse_submit_response(
            r#"<wps:Result xmlns:wps="http://www.opengis.net/wps/2.0"><wps:JobID>f3780917-92c0</wps:JobID></wps:Result>"#,
        )
        .unwrap();
        assert_eq!(id, "f3780917-92c0");
    }

    #[test]
    fn submit_exception_report() {
        let err = parse_submit_response(
            r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/2.0"><ows:Exception exceptionCode="NoSuchProcess"><ows:ExceptionText>unknown algorithm</ows:ExceptionText></ows:Exception></ows:ExceptionReport>"#,
        )
        .unwrap_err();
        match err {
            Error::JobRejected { code, detail } => {
                assert_eq!(code, "NoSuchProcess");
                assert_eq!(detail, "unknown algorithm");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn status_and_results() {
        let status = parse_status(
            r#"<wps:StatusInfo xmlns:wps="http://www.opengis.net/wps/2.0"><wps:JobID>j</wps:JobID><wps:Status>Running</wps:Status></wps:StatusInfo>"#,
        )
        .unwrap();
        assert_eq!(status, JobStatus::Running);

        let (outputs, traceback) = parse_result(
            r#"<wps:Result xmlns:wps="http://www.opengis.net/wps/2.0">
                 <wps:JobID>j</wps:JobID>
                 <wps:Output id="output-j">
                   <wps:Data>http://maap/out/j</wps:Data>
                   <wps:Data>s3://maap/out/j</wps:Data>
                 </wps:Output>
                 <wps:Error><wps:Line>boom</wps:Line></wps:Error>
               </wps:Result>"#,
        )
        .unwrap();
        assert_eq!(outputs, vec!["http://maap/out/j", "s3://maap/out/j"]);
        assert_eq!(traceback, vec!["boom"]);
    }

    #[test]
    fn metrics_document() {
        let metrics = parse_metrics(
            "<metrics><machine_type>t3.large</machine_type><job_duration_seconds>12.5</job_duration_seconds><swap_usage/></metrics>",
        )
        .unwrap();
        assert_eq!(metrics.machine_type(), Some("t3.large"));
        assert_eq!(metrics.job_duration_seconds(), Some(12.5));
        assert_eq!(metrics.get("swap_usage"), None);
        assert_eq!(metrics.len(), 3);
    }
}
