//! Shell Command Macros
//!
//! Provides proc macros for defining shell commands with minimal boilerplate:
//! - `#[shell_command]` - Marks a function as a shell command
//! - `#[shell_commands]` - Generates the registry entries for a category

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr};

/// Parsed arguments from
/// `#[shell_command(name = "...", usage = "...", description = "...", aliases = "...", help = "...")]`
struct ShellCommandAttrArgs {
    name: String,
    usage: String,
    description: String,
    aliases: Vec<String>,
    help: Vec<String>,
}

impl syn::parse::Parse for ShellCommandAttrArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut name = None;
        let mut usage = None;
        let mut description = None;
        let mut aliases = Vec::new();
        let mut help = Vec::new();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<syn::Token![=]>()?;
            let value: LitStr = input.parse()?;

            match ident.to_string().as_str() {
                "name" => name = Some(value.value()),
                "usage" => usage = Some(value.value()),
                "description" => description = Some(value.value()),
                // comma separated
                "aliases" => aliases.extend(
                    value
                        .value()
                        .split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string),
                ),
                // one line per occurrence
                "help" => help.push(value.value()),
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {}", other),
                    ))
                }
            }

            // Consume optional comma
            if input.peek(syn::Token![,]) {
                input.parse::<syn::Token![,]>()?;
            }
        }

        Ok(ShellCommandAttrArgs {
            name: name.ok_or_else(|| syn::Error::new(input.span(), "missing `name`"))?,
            usage: usage.ok_or_else(|| syn::Error::new(input.span(), "missing `usage`"))?,
            description: description
                .ok_or_else(|| syn::Error::new(input.span(), "missing `description`"))?,
            aliases,
            help,
        })
    }
}

/// Attribute macro to mark a function as a shell command.
///
/// # Arguments
/// - `name` - The command name (e.g., "head")
/// - `usage` - Usage string (e.g., "head [n=5]")
/// - `description` - Brief description
/// - `aliases` - Optional comma separated alternative names
/// - `help` - Optional detail line, may be repeated
///
/// # Example
/// ```ignore
/// #[shell_command(name = "head", usage = "head [n=5]", description = "Keep the first N items", aliases = "take")]
/// fn cmd_head(env: Rc<ExecEnv>, stdin: Option<Reader<Value>>, stdout: Writer<Value>, args: Option<String>) -> BoxedLocal<Result<()>> { ... }
/// ```
///
/// Only meaningful inside an impl block annotated with `#[shell_commands]`,
/// which consumes it.
#[proc_macro_attribute]
pub fn shell_command(attr: TokenStream, item: TokenStream) -> TokenStream {
    if let Err(e) = syn::parse::<ShellCommandAttrArgs>(attr) {
        return e.to_compile_error().into();
    }
    item
}

/// Parses shell command metadata from a #[shell_command(...)] attribute
fn parse_shell_command_attr(attr: &Attribute) -> syn::Result<ShellCommandInfo> {
    let args: ShellCommandAttrArgs = attr.parse_args()?;
    Ok(ShellCommandInfo {
        name: args.name,
        usage: args.usage,
        description: args.description,
        aliases: args.aliases,
        help: args.help,
        method_ident: None, // Will be filled in by caller
    })
}

struct ShellCommandInfo {
    name: String,
    usage: String,
    description: String,
    aliases: Vec<String>,
    help: Vec<String>,
    method_ident: Option<Ident>,
}

/// Attribute macro to generate the shell command registry for a category.
///
/// This macro:
/// 1. Collects all functions marked with `#[shell_command]`
/// 2. Strips the attribute from each of them
/// 3. Generates `specs()` returning one `CommandSpec` per command, which
///    `Registry` uses for dispatch, aliases and help
///
/// # Example
/// ```ignore
/// #[shell_commands]
/// impl StreamCommands {
///     #[shell_command(name = "len", usage = "len [items...]", description = "Length of each input")]
///     fn cmd_len(...) -> ... { }
/// }
/// ```
#[proc_macro_attribute]
pub fn shell_commands(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemImpl);

    // Collect command information
    let mut commands: Vec<ShellCommandInfo> = Vec::new();
    let mut methods: Vec<ImplItemFn> = Vec::new();
    let mut other_items: Vec<ImplItem> = Vec::new();

    for item in input.items {
        match item {
            ImplItem::Fn(mut method) => {
                // Check if this method has #[shell_command] attribute
                let cmd_attr = method
                    .attrs
                    .iter()
                    .find(|a| a.path().is_ident("shell_command"));

                if let Some(attr) = cmd_attr {
                    match parse_shell_command_attr(attr) {
                        Ok(mut info) => {
                            info.method_ident = Some(method.sig.ident.clone());
                            commands.push(info);
                        }
                        Err(e) => return e.to_compile_error().into(),
                    }

                    // Remove the shell_command attribute from the output
                    method.attrs.retain(|a| !a.path().is_ident("shell_command"));
                }

                methods.push(method);
            }
            other => other_items.push(other),
        }
    }

    // Generate specs()
    let spec_items: Vec<proc_macro2::TokenStream> = commands.iter().filter_map(|cmd| {
        let name = &cmd.name;
        let usage = &cmd.usage;
        let description = &cmd.description;
        let aliases = &cmd.aliases;
        let help = &cmd.help;
        let method_ident = cmd.method_ident.as_ref()?;
        Some(quote! {
            crate::shell::commands::CommandSpec {
                name: #name,
                usage: #usage,
                description: #description,
                help: &[#(#help),*],
                aliases: &[#(#aliases),*],
                run: Some(Self::#method_ident as crate::shell::commands::CommandFn),
            }
        })
    }).collect();

    // Reconstruct the impl block
    let self_ty = &input.self_ty;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let output = quote! {
        impl #impl_generics #self_ty #ty_generics #where_clause {
            #(#methods)*

            #(#other_items)*

            /// Registry entries for every command in this category.
            pub fn specs() -> Vec<crate::shell::commands::CommandSpec> {
                vec![#(#spec_items),*]
            }
        }
    };

    output.into()
}
