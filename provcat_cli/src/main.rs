#[macro_use]
extern crate clap;
extern crate loggerv;
extern crate serde_yaml;

extern crate provcat;

use std::io::Read;

use clap::{App, AppSettings, Arg, ArgMatches};

use provcat::oc::{Connection, Oc};
use provcat::provision::{self, Action, PatchType, ProvisionRequest};
use provcat::{multidoc, record, Result};

fn main() {
    let args = App::new("provcat")
        .version(crate_version!())
        .about("Provision right meow.")
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .arg(
            Arg::with_name("file")
                .short("f")
                .long("file")
                .takes_value(true)
                .required(true)
                .help("Yaml stream of resource documents, or '-' for stdin"),
        )
        .arg(
            Arg::with_name("action")
                .long("action")
                .takes_value(true)
                .default_value("apply")
                .possible_values(&["apply", "create", "replace", "patch", "delete", "ignore"])
                .help("What to do with each resource"),
        )
        .arg(
            Arg::with_name("namespace")
                .short("n")
                .long("namespace")
                .takes_value(true)
                .help("Namespace for resources that do not carry one"),
        )
        .arg(
            Arg::with_name("patch-type")
                .long("patch-type")
                .takes_value(true)
                .default_value("strategic")
                .possible_values(&["strategic", "json", "merge"])
                .help("Patch strategy for the patch action"),
        )
        .arg(
            Arg::with_name("check")
                .long("check")
                .help("Report what would change without mutating the cluster"),
        )
        .arg(
            Arg::with_name("fail-on-change")
                .long("fail-on-change")
                .help("Fail if any resource would change"),
        )
        .arg(
            Arg::with_name("generate-resources")
                .long("generate-resources")
                .help("Write adopted resources to manifests/ instead of mutating"),
        )
        .arg(
            Arg::with_name("change-record")
                .long("change-record")
                .takes_value(true)
                .help("Append a yaml record of every change to this file"),
        )
        .arg(
            Arg::with_name("oc-cmd")
                .long("oc-cmd")
                .takes_value(true)
                .help("Cluster CLI to delegate to (default: oc)"),
        )
        .arg(
            Arg::with_name("server")
                .long("server")
                .takes_value(true)
                .help("The address and port of the Kubernetes API server"),
        )
        .arg(
            Arg::with_name("certificate-authority")
                .long("certificate-authority")
                .takes_value(true)
                .help("Path to a cert file for the certificate authority"),
        )
        .arg(
            Arg::with_name("token")
                .long("token")
                .takes_value(true)
                .help("Bearer token for authentication to the API server"),
        )
        .arg(
            Arg::with_name("insecure-skip-tls-verify")
                .long("insecure-skip-tls-verify")
                .help("Skip server certificate validation"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Increase logging verbosity"),
        )
        .get_matches();

    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose"))
        .module_path(true)
        .line_numbers(false)
        .init()
        .unwrap();

    if let Err(e) = run(&args) {
        eprintln!("ERROR: {}", e);
        for cause in e.iter_causes() {
            eprintln!("caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn run(args: &ArgMatches) -> Result<()> {
    let input = match args.value_of("file").unwrap() {
        "-" => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
        path => std::fs::read_to_string(path)?,
    };

    let action: Action = args.value_of("action").unwrap().parse()?;
    let patch_type: PatchType = args.value_of("patch-type").unwrap().parse()?;
    let conn = Connection {
        oc_cmd: args.value_of("oc-cmd").map(String::from),
        server: args.value_of("server").map(String::from),
        certificate_authority: args.value_of("certificate-authority").map(String::from),
        token: args.value_of("token").map(String::from),
        insecure_skip_tls_verify: if args.is_present("insecure-skip-tls-verify") {
            Some("true".to_string())
        } else {
            None
        },
    };
    let oc = Oc::new(&conn);
    let namespace = args.value_of("namespace").map(String::from);
    let change_record = args.value_of("change-record");

    for resource in multidoc::resource_list(&input)? {
        let req = ProvisionRequest {
            action,
            patch_type,
            namespace: namespace.clone(),
            resource,
            fail_on_change: args.is_present("fail-on-change"),
            check_mode: args.is_present("check"),
            generate_resources: args.is_present("generate-resources"),
        };
        let result = match provision::provision(&oc, &req) {
            Ok(result) => result,
            Err(e) => {
                // failure envelope: message, action, trace, offending doc
                eprintln!("provisioning failed: {}", e);
                eprintln!("action: {}", req.action);
                let trace = e.backtrace().to_string();
                if !trace.is_empty() {
                    eprintln!("{}", trace);
                }
                eprintln!("resource:\n{}", serde_yaml::to_string(&req.resource)?);
                return Err(e);
            }
        };
        if let Some(path) = change_record {
            record::record_provision(path, &result)?;
        }
        println!("{}", serde_yaml::to_string(&result)?);
    }
    Ok(())
}
