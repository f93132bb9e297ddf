use proc_macro::TokenStream;
use quote::quote;
use syn::{parse::Parser, parse_macro_input, Data, DataStruct, DeriveInput, Fields, Meta};

/// 生成 `HydrationTarget` 的实现和 `COLUMNS` 常量
///
/// 字段属性：
/// - `#[entity(skip)]`：不参与填充与导出
/// - `#[entity(column = "...")]`：列名与字段名不同时使用
/// - `#[entity(setter)]`：填充时调用 `set_<field>(value)` 而不是直接赋值
///
/// 使用示例：
/// ```ignore
/// #[derive(Debug, Default, Entity)]
/// struct File {
///     file_id: i64,
///     #[entity(column = "file_name")]
///     name: String,
///     #[entity(setter)]
///     size: i64,
///     #[entity(skip)]
///     cached: Option<Vec<u8>>,
/// }
///
/// impl File {
///     fn set_size(&mut self, size: i64) {
///         self.size = size.max(0);
///     }
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(fields),
            ..
        }) => &fields.named,
        _ => {
            return syn::Error::new_spanned(
                name,
                "Entity derive only supports structs with named fields",
            )
            .to_compile_error()
            .into();
        }
    };

    let mut columns: Vec<syn::LitStr> = Vec::new();
    let mut extract_fields: Vec<&syn::Ident> = Vec::new();
    let mut assign_arms = Vec::new();
    let mut setter_arms = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = match parse_field_attrs(&field.attrs) {
            Ok(attrs) => attrs,
            Err(err) => return err.to_compile_error().into(),
        };
        if attrs.skip {
            continue;
        }

        let field_str = field_name.to_string().trim_start_matches("r#").to_string();
        let column = attrs.column.unwrap_or_else(|| field_str.clone());

        // 填充时的属性名：列名经过 camelCase 转换，也接受原始的字段名与列名
        let mut keys = vec![
            to_camel_case(&column),
            column.clone(),
            to_camel_case(&field_str),
            field_str.clone(),
        ];
        dedup(&mut keys);

        let key_lits: Vec<syn::LitStr> = keys
            .iter()
            .map(|k| syn::LitStr::new(k, proc_macro2::Span::call_site()))
            .collect();
        let column_lit = syn::LitStr::new(&column, proc_macro2::Span::call_site());

        assign_arms.push(quote! {
            #(#key_lits)|* => {
                self.#field_name = ::sqlgate::FromValue::from_value(value.clone())?;
                Ok(true)
            }
        });

        if attrs.setter {
            let method = syn::Ident::new(&format!("set_{}", field_str), field_name.span());
            let mut setters = vec![
                setter_name(&to_camel_case(&column)),
                setter_name(&to_camel_case(&field_str)),
            ];
            dedup(&mut setters);
            let setter_lits: Vec<syn::LitStr> = setters
                .iter()
                .map(|s| syn::LitStr::new(s, proc_macro2::Span::call_site()))
                .collect();
            setter_arms.push(quote! {
                #(#setter_lits)|* => {
                    self.#method(::sqlgate::FromValue::from_value(value.clone())?);
                    Ok(true)
                }
            });
        }

        columns.push(column_lit);
        extract_fields.push(field_name);
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let column_count = columns.len();

    let expanded = quote! {
        impl #impl_generics ::sqlgate::hydrator::HydrationTarget for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn call_setter(
                &mut self,
                setter: &str,
                value: &::sqlgate::BindValue,
            ) -> ::sqlgate::Result<bool> {
                match setter {
                    #(#setter_arms)*
                    _ => Ok(false),
                }
            }

            fn assign(
                &mut self,
                property: &str,
                value: &::sqlgate::BindValue,
            ) -> ::sqlgate::Result<bool> {
                match property {
                    #(#assign_arms)*
                    _ => Ok(false),
                }
            }

            fn extract(&self) -> ::sqlgate::Row {
                let mut row = ::sqlgate::Row::with_capacity(#column_count);
                #(
                    row.insert(#columns, ::sqlgate::BindValue::from(self.#extract_fields.clone()));
                )*
                row
            }
        }

        impl #impl_generics #name #ty_generics #where_clause {
            /// 参与填充与导出的列，按字段顺序
            pub const COLUMNS: &'static [&'static str] = &[#(#columns),*];
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    setter: bool,
    column: Option<String>,
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                attr,
                "expected #[entity(skip)], #[entity(setter)] or #[entity(column = \"...\")]",
            ));
        };
        let parser = syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated;
        for meta in parser.parse2(list.tokens.clone())? {
            match meta {
                Meta::Path(path) if path.is_ident("skip") => parsed.skip = true,
                Meta::Path(path) if path.is_ident("setter") => parsed.setter = true,
                Meta::NameValue(nv) if nv.path.is_ident("column") => {
                    if let syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Str(s),
                        ..
                    }) = &nv.value
                    {
                        parsed.column = Some(s.value());
                    } else {
                        return Err(syn::Error::new_spanned(
                            &nv.value,
                            "column must be a string literal",
                        ));
                    }
                }
                other => {
                    return Err(syn::Error::new_spanned(other, "unknown entity attribute"));
                }
            }
        }
    }
    Ok(parsed)
}

/// 与运行时的 `to_camel_case` 保持一致：只合并下划线后的小写字母
fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('_', Some(next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

fn setter_name(property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

fn dedup(items: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(item.clone());
            true
        }
    });
}
