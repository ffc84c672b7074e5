use prost::Message;
use prost_types::compiler::{
    code_generator_response::{Feature, File},
    CodeGeneratorRequest, CodeGeneratorResponse,
};
use tracing::{error, info};

use crate::{error::GeneratorResult, GrpcMockBuilder};

impl GrpcMockBuilder {
    /// Runs one protoc plugin invocation: decodes the `CodeGeneratorRequest` in
    /// `input`, applies its parameter and returns the encoded
    /// `CodeGeneratorResponse`.
    ///
    /// Generation failures are reported to protoc inside the response, which
    /// then carries no files.
    ///
    /// # Errors
    ///
    /// Will return [`GeneratorError::DecodeError`](crate::error::GeneratorError::DecodeError)
    /// if `input` is not a valid request.
    pub fn process(self, input: &[u8]) -> GeneratorResult<Vec<u8>> {
        let request = CodeGeneratorRequest::decode(input)?;

        let response = match self
            .parameter(request.parameter())
            .and_then(|builder| builder.generate(&request))
        {
            Ok(files) => {
                info!(files = files.len(), "generated mock files");
                CodeGeneratorResponse {
                    file: files
                        .into_iter()
                        .map(|file| File {
                            name: Some(file.name),
                            content: Some(file.content),
                            ..Default::default()
                        })
                        .collect(),
                    ..response_template()
                }
            }
            Err(err) => {
                error!(error = %err, "mock generation failed");
                CodeGeneratorResponse {
                    error: Some(err.to_string()),
                    ..response_template()
                }
            }
        };

        Ok(response.encode_to_vec())
    }
}

fn response_template() -> CodeGeneratorResponse {
    CodeGeneratorResponse {
        supported_features: Some(Feature::Proto3Optional as u64),
        ..Default::default()
    }
}
