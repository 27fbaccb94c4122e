use console::Style;
use decon_core::config::RunConfig;
use decon_core::prep::Boundary;
use decon_core::volume::Volume;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_run_summary(config: &RunConfig, input: &Volume, psf: &Volume, device_name: &str) {
    let s = Styles::new();
    let params = &config.deconvolution;

    println!();
    println!("  {}", s.title.apply_to("Deconvolution"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(13)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("PSF"),
        s.path.apply_to(config.psf.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Device"),
        s.method.apply_to(device_name)
    );
    println!();

    println!("  {}", s.header.apply_to("Volumes"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Image"),
        s.value.apply_to(format!("{} ({})", input.dims(), input.element_type))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("PSF"),
        s.value.apply_to(format!("{} ({})", psf.dims(), psf.element_type))
    );
    println!();

    println!("  {}", s.header.apply_to("Richardson-Lucy"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Iterations"),
        s.value.apply_to(params.iterations)
    );
    if params.regularization > 0.0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("TV weight"),
            s.value.apply_to(params.regularization)
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("TV weight"),
            s.disabled.apply_to("disabled")
        );
    }
    let boundary = match params.boundary {
        Boundary::Mirror => "mirror",
        Boundary::ZeroFill => "zero fill",
    };
    println!(
        "    {:<12}{}",
        s.label.apply_to("Boundary"),
        s.method.apply_to(boundary)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Sizing"),
        s.method.apply_to(format!("{:?}", params.sizing).to_lowercase())
    );
    if params.non_circulant {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Edges"),
            s.method.apply_to("non-circulant")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Edges"),
            s.disabled.apply_to("circulant")
        );
    }
    println!();
}
