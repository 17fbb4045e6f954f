use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Meta};

/// Generates the `Schedulable` registration list for a module type.
///
/// Apply it to an inherent impl block and mark methods with `#[task]` or
/// `#[cron("expr")]`. Marked methods take `&self` only and return either `()`
/// or `Result<(), E>`.
///
/// ```rust,ignore
/// struct Backup { /* ... */ }
///
/// #[schedulable]
/// impl Backup {
///     #[task]
///     fn watch(&self) -> anyhow::Result<()> {
///         // runs once at startup, retried until it returns Ok
///         Ok(())
///     }
///
///     #[cron("0 3 * * *")]
///     fn nightly(&self) {
///         // runs every night at 03:00
///     }
///
///     #[cron("* * * * * */10")]
///     fn poll(&self) {
///         // every ten seconds (trailing seconds field)
///     }
/// }
/// ```
///
/// Registration order follows declaration order; unmarked methods are ignored.
#[proc_macro_attribute]
pub fn schedulable(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        let args = TokenStream2::from(args);
        return syn::Error::new(args.span(), "#[schedulable] takes no arguments")
            .to_compile_error()
            .into();
    }

    let mut item = syn::parse_macro_input!(input as ItemImpl);
    match expand(&mut item) {
        Ok(expanded) => expanded.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

enum Marker {
    Task,
    Cron(LitStr),
}

fn expand(item: &mut ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[schedulable] must be applied to an inherent impl block",
        ));
    }

    let mut registrations = Vec::new();
    for impl_item in item.items.iter_mut() {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let Some(marker) = take_marker(&mut method.attrs)? else {
            continue;
        };
        check_signature(method)?;

        let ident = &method.sig.ident;
        let name = ident.to_string();
        registrations.push(match marker {
            Marker::Task => quote! {
                .task(#name, {
                    let this = ::std::sync::Arc::clone(&self);
                    move || this.#ident()
                })
            },
            Marker::Cron(expression) => quote! {
                .cron(#name, #expression, {
                    let this = ::std::sync::Arc::clone(&self);
                    move || this.#ident()
                })
            },
        });
    }

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        #item

        impl #impl_generics ::modhost_runtime::Schedulable for #self_ty #where_clause {
            fn schedulables(self: ::std::sync::Arc<Self>) -> ::modhost_runtime::Schedulables {
                ::modhost_runtime::Schedulables::new()
                    #(#registrations)*
            }
        }
    })
}

/// Remove `#[task]` / `#[cron(...)]` from a method, returning which one was present.
fn take_marker(attrs: &mut Vec<Attribute>) -> syn::Result<Option<Marker>> {
    let mut marker = None;
    let mut kept = Vec::with_capacity(attrs.len());

    for attr in attrs.drain(..) {
        let found = if attr.path().is_ident("task") {
            if !matches!(attr.meta, Meta::Path(_)) {
                return Err(syn::Error::new(attr.span(), "#[task] takes no arguments"));
            }
            Marker::Task
        } else if attr.path().is_ident("cron") {
            let expression: LitStr = attr.parse_args().map_err(|_| {
                syn::Error::new(attr.span(), "expected a cron expression, e.g. #[cron(\"*/5 * * * *\")]")
            })?;
            check_field_count(&expression)?;
            Marker::Cron(expression)
        } else {
            kept.push(attr);
            continue;
        };

        if marker.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "a method can be marked with only one of #[task] or #[cron]",
            ));
        }
        marker = Some(found);
    }

    *attrs = kept;
    Ok(marker)
}

fn check_field_count(expression: &LitStr) -> syn::Result<()> {
    let fields = expression.value().split_whitespace().count();
    if fields == 5 || fields == 6 {
        Ok(())
    } else {
        Err(syn::Error::new(
            expression.span(),
            format!("cron expression must have 5 or 6 fields, found {fields}"),
        ))
    }
}

fn check_signature(method: &ImplItemFn) -> syn::Result<()> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "scheduled methods run on a blocking thread and cannot be async",
        ));
    }
    let takes_ref_self = matches!(
        sig.inputs.first(),
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none()
    );
    if !takes_ref_self || sig.inputs.len() != 1 || !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.span(),
            "scheduled methods must take `&self` and no other arguments",
        ));
    }
    Ok(())
}
