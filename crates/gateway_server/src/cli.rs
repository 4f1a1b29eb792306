/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The CLI surface (§1: "CLI/launcher" is an external collaborator, but
//! still the ambient way the binary starts). Grounded on
//! `edgen_server::cli`, trimmed to the two subcommands this gateway needs;
//! there is no config file or OpenAPI dump in this gateway's scope.

use argh::FromArgs;
use once_cell::sync::Lazy;

/// An OpenAI-compatible gateway to a multi-agent upstream.
#[derive(FromArgs, PartialEq, Debug)]
pub struct TopLevel {
    #[argh(subcommand)]
    pub command: Command,
}

/// The parsed command line, computed once at process start.
pub static PARSED_COMMANDS: Lazy<TopLevel> = Lazy::new(|| argh::from_env());

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Command {
    Serve(Serve),
    Version(Version),
    Oasgen(Oasgen),
}

/// Start the HTTP server.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "serve")]
pub struct Serve {
    /// the address to bind (default: 0.0.0.0:8080)
    #[argh(option, default = "String::from(\"0.0.0.0:8080\")")]
    pub uri: String,
}

/// Print the gateway's version and exit.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "version")]
pub struct Version {}

/// Print the gateway's OpenAPI spec and exit.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "oasgen")]
pub struct Oasgen {
    /// emit yaml (the default).
    #[argh(switch, short = 'y')]
    pub yaml: bool,
    /// emit JSON instead of yaml.
    #[argh(switch, short = 'j')]
    pub json: bool,
}
